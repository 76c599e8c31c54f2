//! Ubuntu system packages.
//!
//! The SDK root needs the C library, the C++ standard library and a few
//! runtime dependencies of Foundation for the run-time architecture. They
//! come from the distribution archive: the `Packages.gz` index of the
//! `main` component maps each package name to a pool path and a SHA-256.

use super::{ArtifactDescriptor, ArtifactRole};
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    settings::{Arch, NamingScheme, PathsConfiguration, Settings, UbuntuRelease},
};
use flate2::read::GzDecoder;
use std::{collections::HashMap, io::Read, path::Path};
use url::Url;

/// Archive mirror serving the primary architectures.
pub const PRIMARY_MIRROR: &str = "http://gb.archive.ubuntu.com/ubuntu";

/// Archive mirror serving every other architecture.
pub const PORTS_MIRROR: &str = "http://ports.ubuntu.com/ubuntu-ports";

/// Identifier of the package index artifact.
pub const PACKAGE_INDEX_ID: &str = "ubuntu-packages-index";

/// Mirror carrying packages for `arch`.
pub fn mirror_for(arch: Arch) -> &'static str {
    match arch {
        Arch::X86_64 => PRIMARY_MIRROR,
        Arch::Arm64 => PORTS_MIRROR,
    }
}

/// Packages whose headers and libraries go into the SDK root.
pub fn required_packages(release: &UbuntuRelease) -> Vec<String> {
    let gcc = release.gcc_major();
    vec![
        "libc6".to_string(),
        "libc6-dev".to_string(),
        "libgcc-s1".to_string(),
        format!("libgcc-{gcc}-dev"),
        format!("libicu{}", release.icu_major()),
        "libicu-dev".to_string(),
        format!("libstdc++-{gcc}-dev"),
        "libstdc++6".to_string(),
        "linux-libc-dev".to_string(),
        "zlib1g".to_string(),
        "zlib1g-dev".to_string(),
    ]
}

/// Descriptor of the `main` component index for the run-time platform.
pub fn package_index_artifact(
    settings: &Settings,
    paths: &PathsConfiguration,
) -> Result<ArtifactDescriptor> {
    let target = settings.platform_target();
    let relative = format!(
        "dists/{}/main/binary-{}/Packages.gz",
        target.distribution.codename(),
        target.arch.name(NamingScheme::Packaging)
    );
    let url = join_mirror(mirror_for(target.arch), &relative)?;
    ArtifactDescriptor::new(
        PACKAGE_INDEX_ID,
        ArtifactRole::PackageIndex,
        url,
        paths.cache_path(&format!("ubuntu/{relative}")),
    )
}

/// One stanza of a `Packages` index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageEntry {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Pool path relative to the mirror root.
    pub filename: String,
    /// SHA-256 of the `.deb`.
    pub sha256: Option<String>,
}

/// Parsed `Packages` index.
#[derive(Clone, Debug, Default)]
pub struct PackageIndex {
    entries: HashMap<String, PackageEntry>,
}

impl PackageIndex {
    /// Parses the plain-text index.
    ///
    /// Stanzas without `Package` or `Filename` are ignored. When a name
    /// appears more than once, the first stanza wins.
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for stanza in text.split("\n\n") {
            let mut fields: HashMap<&str, &str> = HashMap::new();
            for line in stanza.lines() {
                // Continuation lines belong to multi-line fields we never read.
                if line.starts_with(' ') || line.starts_with('\t') {
                    continue;
                }
                if let Some((key, value)) = line.split_once(':') {
                    fields.insert(key.trim(), value.trim());
                }
            }

            let (Some(name), Some(filename)) = (fields.get("Package"), fields.get("Filename"))
            else {
                continue;
            };
            entries
                .entry((*name).to_string())
                .or_insert_with(|| PackageEntry {
                    name: (*name).to_string(),
                    version: fields.get("Version").copied().unwrap_or_default().to_string(),
                    filename: (*filename).to_string(),
                    sha256: fields.get("SHA256").map(|s| s.to_ascii_lowercase()),
                });
        }
        Self { entries }
    }

    /// Decompresses and parses a cached `Packages.gz`.
    pub async fn load(path: &Path) -> Result<Self> {
        let compressed = tokio::fs::read(path)
            .await
            .fs_context("reading package index", path)?;
        let display = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut text = String::new();
            GzDecoder::new(compressed.as_slice())
                .read_to_string(&mut text)
                .fs_context("decompressing package index", &display)?;
            Ok::<_, Error>(Self::parse(&text))
        })
        .await?
    }

    /// Looks up a package by name.
    pub fn get(&self, name: &str) -> Option<&PackageEntry> {
        self.entries.get(name)
    }

    /// Number of distinct packages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index lists no packages.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolves every required package to a `.deb` descriptor.
///
/// Fails with [`Error::PackageNotFound`] on the first package missing from
/// `index`. The result is ordered like [`required_packages`].
pub fn resolve_packages(
    index: &PackageIndex,
    settings: &Settings,
    paths: &PathsConfiguration,
) -> Result<Vec<ArtifactDescriptor>> {
    let target = settings.platform_target();
    let mirror = mirror_for(target.arch);
    let index_url = package_index_artifact(settings, paths)?.remote_url().to_string();

    required_packages(&target.distribution)
        .into_iter()
        .map(|package| {
            let entry = index.get(&package).ok_or_else(|| Error::PackageNotFound {
                package: package.clone(),
                index: index_url.clone(),
            })?;
            let url = join_mirror(mirror, &entry.filename)?;
            let descriptor = ArtifactDescriptor::new(
                format!("deb-{package}"),
                ArtifactRole::SystemPackage,
                url,
                paths.cache_path(&format!("ubuntu/{}", entry.filename)),
            )?;
            Ok(match &entry.sha256 {
                Some(sha256) => descriptor.with_checksum(sha256),
                None => descriptor,
            })
        })
        .collect()
}

fn join_mirror(mirror: &str, relative: &str) -> Result<Url> {
    let text = format!("{}/{}", mirror.trim_end_matches('/'), relative.trim_start_matches('/'));
    Url::parse(&text).map_err(|e| Error::InvalidUrl {
        url: text.clone(),
        reason: e.to_string(),
    })
}
