//! In-process extraction.
//!
//! Tarballs and Debian packages are unpacked with `tar`, `ar` and the
//! decompressors from the dependency stack on a blocking thread. Installer
//! packages need `xar` to open the outer archive and `cpio` for each inner
//! payload; both are looked up once with `which`.

use super::{ExtractionEnvironment, UnpackRequest, run_command};
use crate::bundler::{
    builder::tool_detection::{HAS_CPIO, HAS_XAR},
    catalog::ArchiveKind,
    error::{Error, ErrorExt, Result},
};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::{Component, Path, PathBuf},
};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use xz2::read::XzDecoder;

/// Unpacks archives on the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalExtraction;

#[async_trait]
impl ExtractionEnvironment for LocalExtraction {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn unpack(&self, request: &UnpackRequest, cancel: &CancellationToken) -> Result<()> {
        match request.kind {
            ArchiveKind::Pkg => unpack_pkg(request, cancel).await,
            ArchiveKind::TarGz | ArchiveKind::TarXz | ArchiveKind::Deb | ArchiveKind::Gzip => {
                let request = request.clone();
                let cancel = cancel.clone();
                tokio::task::spawn_blocking(move || unpack_sync(&request, &cancel)).await?
            }
        }
    }
}

fn unpack_sync(request: &UnpackRequest, cancel: &CancellationToken) -> Result<()> {
    let file = File::open(&request.archive).fs_context("opening archive", &request.archive)?;
    let reader = BufReader::new(file);

    let entries = match request.kind {
        ArchiveKind::TarGz => unpack_tar(GzDecoder::new(reader), request, cancel)?,
        ArchiveKind::TarXz => unpack_tar(XzDecoder::new(reader), request, cancel)?,
        ArchiveKind::Deb => unpack_deb(reader, request, cancel)?,
        ArchiveKind::Gzip => {
            gunzip_file(reader, request)?;
            1
        }
        ArchiveKind::Pkg => return Err(Error::UnsupportedArchiveFormat(request.kind.to_string())),
    };

    log::debug!(
        "Unpacked {} entries from {}",
        entries,
        request.archive.display()
    );
    Ok(())
}

/// Drops `.` components and the first `strip` remaining ones.
///
/// Returns `None` for entries consumed entirely by stripping and for
/// entries that would escape the destination.
fn stripped_path(path: &Path, strip: u32) -> Option<PathBuf> {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => components.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if components.len() <= strip as usize {
        return None;
    }
    Some(components[strip as usize..].iter().collect())
}

/// Unpacks a tar stream into `request.destination`.
///
/// Entries are confined to the destination: parent directories are created
/// one component at a time and never through a symlink, and hard links must
/// resolve inside it. Returns the number of entries written.
fn unpack_tar<R: Read>(
    reader: R,
    request: &UnpackRequest,
    cancel: &CancellationToken,
) -> Result<usize> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let dest = request
        .destination
        .canonicalize()
        .fs_context("resolving destination", &request.destination)?;
    let mut written = 0;

    for entry in archive.entries().fs_context("reading archive", &request.archive)? {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut entry = entry.fs_context("reading archive entry", &request.archive)?;
        let path = entry
            .path()
            .fs_context("reading entry path", &request.archive)?
            .into_owned();

        let Some(relative) = stripped_path(&path, request.strip_components) else {
            continue;
        };
        if !request.keeps(&relative) {
            continue;
        }

        if let Some(parent) = relative.parent() {
            create_dirs_within(&dest, parent, request, &relative)?;
        }
        let target = dest.join(&relative);
        remove_leaf_symlink(&target)?;

        if entry.header().entry_type().is_hard_link() {
            // Link names are archive paths; resolve them inside the destination.
            let link = entry
                .link_name()
                .fs_context("reading hard link", &request.archive)?
                .and_then(|name| stripped_path(&name, request.strip_components));
            let Some(link) = link else { continue };
            let source = match dest.join(link).canonicalize() {
                Ok(source) if source.starts_with(&dest) => source,
                Ok(_) => return Err(unsafe_entry(request, &relative)),
                Err(_) => {
                    log::debug!("Skipping hard link to filtered entry {}", relative.display());
                    continue;
                }
            };
            let _ = std::fs::remove_file(&target);
            if std::fs::hard_link(&source, &target).is_err() {
                std::fs::copy(&source, &target).fs_context("copying hard link", &target)?;
            }
        } else {
            entry.unpack(&target).fs_context("unpacking entry", &target)?;
        }
        written += 1;
    }

    Ok(written)
}

/// Creates `relative` below `dest` without following symlinks.
fn create_dirs_within(
    dest: &Path,
    relative: &Path,
    request: &UnpackRequest,
    entry: &Path,
) -> Result<()> {
    let mut current = dest.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                return Err(unsafe_entry(request, entry));
            }
            Ok(metadata) if metadata.is_dir() => {}
            _ => std::fs::create_dir(&current).fs_context("creating directory", &current)?,
        }
    }
    Ok(())
}

/// Removes a symlink an earlier entry left where this entry goes.
fn remove_leaf_symlink(target: &Path) -> Result<()> {
    match std::fs::symlink_metadata(target) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            std::fs::remove_file(target).fs_context("replacing symlink", target)
        }
        _ => Ok(()),
    }
}

fn unsafe_entry(request: &UnpackRequest, entry: &Path) -> Error {
    Error::UnsafeArchiveEntry {
        archive: request.archive.clone(),
        entry: entry.display().to_string(),
    }
}

/// Unpacks the `data.tar.*` member of a Debian package.
fn unpack_deb<R: Read>(
    reader: R,
    request: &UnpackRequest,
    cancel: &CancellationToken,
) -> Result<usize> {
    let mut archive = ar::Archive::new(reader);

    while let Some(entry) = archive.next_entry() {
        let entry = entry.fs_context("reading package", &request.archive)?;
        let identifier = String::from_utf8_lossy(entry.header().identifier()).into_owned();

        match identifier.trim_end_matches('/') {
            "data.tar.gz" => return unpack_tar(GzDecoder::new(entry), request, cancel),
            "data.tar.xz" => return unpack_tar(XzDecoder::new(entry), request, cancel),
            "data.tar.zst" => {
                let decoder = zstd::stream::read::Decoder::new(entry)
                    .fs_context("opening zstd stream", &request.archive)?;
                return unpack_tar(decoder, request, cancel);
            }
            "data.tar" => return unpack_tar(entry, request, cancel),
            _ => continue,
        }
    }

    Err(Error::MissingContent {
        artifact: request.archive.display().to_string(),
        path: "data.tar.*".to_string(),
    })
}

/// Decompresses a single gzip file into the destination, dropping `.gz`.
fn gunzip_file<R: Read>(reader: R, request: &UnpackRequest) -> Result<()> {
    let name = request
        .archive
        .file_name()
        .map(|name| name.to_string_lossy().trim_end_matches(".gz").to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::UnsupportedArchiveFormat(request.archive.display().to_string()))?;
    let target = request.destination.join(name);

    let mut output = File::create(&target).fs_context("creating file", &target)?;
    io::copy(&mut GzDecoder::new(reader), &mut output).fs_context("decompressing", &target)?;
    Ok(())
}

/// Unpacks an installer package: `xar` for the outer archive, then every
/// nested `Payload` through `cpio` into the same destination.
async fn unpack_pkg(request: &UnpackRequest, cancel: &CancellationToken) -> Result<()> {
    if !*HAS_XAR || !*HAS_CPIO {
        return Err(Error::CommandFailed {
            command: "xar/cpio".to_string(),
            reason: "installer packages need `xar` and `cpio` in PATH; rerun with --with-docker \
                     to unpack them in a container"
                .to_string(),
        });
    }

    let staging = tempfile::Builder::new()
        .prefix("pkg-")
        .tempdir()
        .fs_context("creating staging directory", std::env::temp_dir())?;

    let mut xar = Command::new("xar");
    xar.arg("-xf")
        .arg(&request.archive)
        .arg("-C")
        .arg(staging.path());
    run_command(
        xar,
        format!("xar -xf {}", request.archive.display()),
        cancel,
    )
    .await?;

    let unpacked = unpack_payloads(staging.path(), &request.destination, cancel).await?;
    if unpacked == 0 {
        return Err(Error::MissingContent {
            artifact: request.archive.display().to_string(),
            path: "Payload".to_string(),
        });
    }
    Ok(())
}

/// Extracts every nested `Payload` below `staging` into one tree at
/// `destination`, returning how many were found.
async fn unpack_payloads(
    staging: &Path,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<usize> {
    let payloads = find_payloads(staging).await?;

    for payload in &payloads {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let cpio_stream = decompress_payload(payload).await?;
        let input = File::open(&cpio_stream).fs_context("opening payload", &cpio_stream)?;

        let mut cpio = Command::new("cpio");
        cpio.arg("-idm")
            .arg("--quiet")
            .current_dir(destination)
            .stdin(input);
        run_command(cpio, format!("cpio -idm < {}", payload.display()), cancel).await?;
    }

    Ok(payloads.len())
}

/// Every file named `Payload` below `root`, in a stable order.
async fn find_payloads(root: &Path) -> Result<Vec<PathBuf>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut payloads = Vec::new();
        for entry in walkdir::WalkDir::new(&root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && entry.file_name() == "Payload" {
                payloads.push(entry.into_path());
            }
        }
        Ok::<_, Error>(payloads)
    })
    .await?
}

/// Writes the uncompressed cpio stream of a payload next to it.
async fn decompress_payload(payload: &Path) -> Result<PathBuf> {
    let payload = payload.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = File::open(&payload).fs_context("opening payload", &payload)?;
        let mut magic = [0u8; 2];
        let is_gzip = file.read_exact(&mut magic).is_ok() && magic == [0x1f, 0x8b];
        if !is_gzip {
            return Ok(payload);
        }

        let target = payload.with_extension("cpio");
        let input = File::open(&payload).fs_context("opening payload", &payload)?;
        let mut output = File::create(&target).fs_context("creating file", &target)?;
        io::copy(&mut GzDecoder::new(BufReader::new(input)), &mut output)
            .fs_context("decompressing payload", &payload)?;
        Ok::<_, Error>(target)
    })
    .await?
}
