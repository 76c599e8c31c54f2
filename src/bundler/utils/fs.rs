//! File system utilities for bundle assembly.
//!
//! Provides idempotent directory operations, merging copies that preserve
//! symlinks, atomic file replacement and symlink rebasing for SDK roots.

use crate::bundler::error::{Error, ErrorExt, Result};
use std::{
    io,
    path::{Component, Path, PathBuf},
};
use tokio::fs;

/// Creates all of the directories of the specified path, erasing it first if specified.
pub async fn create_dir_all(path: &Path, erase: bool) -> Result<()> {
    if erase {
        remove_dir_all(path).await?;
    }

    // create_dir_all is already idempotent - succeeds even if dir exists
    fs::create_dir_all(path)
        .await
        .fs_context("creating directory", path)
}

/// Removes the directory and its contents if it exists.
pub async fn remove_dir_all(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()), // Idempotent
        Err(e) => Err(e).fs_context("removing directory", path),
    }
}

/// Removes a file if it exists.
pub async fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).fs_context("removing file", path),
    }
}

/// Makes a symbolic link.
#[cfg(unix)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(src, dst)
}

/// Makes a symbolic link to a file.
#[cfg(windows)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(src, dst)
}

/// Copies a regular file, creating parent directories of the destination
/// as necessary and replacing anything already there.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.is_file() {
        crate::bail!("{} is not a file", from.display());
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("creating directory", dest_dir)?;
    }
    remove_file(to).await?;
    fs::copy(from, to).await.fs_context("copying file", from)?;
    Ok(())
}

/// Recursively copies `from` into `to`, merging with existing content.
///
/// Directories are merged, files and symlinks already present at the
/// destination are replaced, symlinks are copied as links.
pub async fn merge_dir(from: &Path, to: &Path) -> Result<()> {
    if !from.is_dir() {
        crate::bail!("{} is not a directory", from.display());
    }

    let from = from.to_path_buf();
    let to = to.to_path_buf();

    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&to).fs_context("creating directory", &to)?;

        for entry in walkdir::WalkDir::new(&from).min_depth(1) {
            let entry = entry?;
            let rel_path = entry.path().strip_prefix(&from)?;
            let dest_path = to.join(rel_path);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if dest_path.is_symlink() || dest_path.is_file() {
                    std::fs::remove_file(&dest_path).fs_context("replacing file", &dest_path)?;
                }
                std::fs::create_dir_all(&dest_path)
                    .fs_context("creating directory", &dest_path)?;
                continue;
            }

            replace_leaf(&dest_path)?;
            if file_type.is_symlink() {
                let target = std::fs::read_link(entry.path())
                    .fs_context("reading symlink", entry.path())?;
                symlink(&target, &dest_path).fs_context("creating symlink", &dest_path)?;
            } else {
                std::fs::copy(entry.path(), &dest_path)
                    .fs_context("copying file", entry.path())?;
            }
        }

        Ok::<_, Error>(())
    })
    .await?
}

/// Clears a destination leaf so a file or link can be written there.
fn replace_leaf(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => {
            std::fs::remove_dir_all(path).fs_context("replacing directory", path)
        }
        Ok(_) => std::fs::remove_file(path).fs_context("replacing file", path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).fs_context("inspecting destination", path),
    }
}

/// Replaces `path` with `contents` in a single rename.
///
/// Readers observe either the previous file or the complete new one.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::GenericError(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent)
        .await
        .fs_context("creating directory", parent)?;

    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
    let temp_path = path.with_file_name(name);

    let written = async {
        fs::write(&temp_path, contents)
            .await
            .fs_context("writing temporary file", &temp_path)?;
        fs::rename(&temp_path, path)
            .await
            .fs_context("replacing file", path)
    }
    .await;

    if written.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    written
}

/// Rewrites every absolute symlink under `root` as a relative one.
///
/// Distribution packages link e.g. `usr/lib/x86_64-linux-gnu/libm.so` to
/// `/lib/x86_64-linux-gnu/libm.so.6`; inside a relocated SDK root such
/// targets must resolve relative to `root`, not to the host filesystem.
///
/// Returns the number of links rewritten.
pub async fn make_symlinks_relative(root: &Path) -> Result<usize> {
    let root = root.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut rewritten = 0;
        for entry in walkdir::WalkDir::new(&root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_symlink() {
                continue;
            }
            let target =
                std::fs::read_link(entry.path()).fs_context("reading symlink", entry.path())?;
            if !target.is_absolute() {
                continue;
            }

            let link_dir = entry
                .path()
                .parent()
                .unwrap_or(root.as_path())
                .strip_prefix(&root)?;
            let relative = relative_path(link_dir, &target);

            std::fs::remove_file(entry.path()).fs_context("replacing symlink", entry.path())?;
            symlink(&relative, entry.path()).fs_context("creating symlink", entry.path())?;
            log::debug!(
                "Rebased symlink {} -> {}",
                entry.path().display(),
                relative.display()
            );
            rewritten += 1;
        }
        Ok::<_, Error>(rewritten)
    })
    .await?
}

/// Path from directory `from` to `to`, both interpreted relative to one root.
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let normal = |path: &Path| -> Vec<std::ffi::OsString> {
        path.components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_os_string()),
                _ => None,
            })
            .collect()
    };
    let from = normal(from);
    let to = normal(to);
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut result = PathBuf::new();
    for _ in common..from.len() {
        result.push("..");
    }
    for part in &to[common..] {
        result.push(part);
    }
    if result.as_os_str().is_empty() {
        result.push(".");
    }
    result
}
