//! Artifact resolution.
//!
//! Turns validated [`Settings`] into concrete [`ArtifactDescriptor`]s: where
//! each component is downloaded from, where it is cached, how it is packed
//! and, when known, what its SHA-256 must be.
//!
//! The build-time components are resolved with the *build* architecture in
//! the vendor-OS spelling; the run-time Swift libraries with the *run-time*
//! architecture in the target-OS triple spelling. Keeping those apart is the
//! main job of this module.

pub mod ubuntu;

use crate::bundler::{
    error::{Context, Error, Result},
    settings::{Arch, NamingScheme, PathsConfiguration, Settings},
};
use handlebars::Handlebars;
use serde_json::json;
use std::{
    fmt,
    path::{Path, PathBuf},
};
use url::Url;

const BUILD_TIME_SWIFT_TEMPLATE: &str = "build-time-swift";
const BUILD_TIME_LLVM_TEMPLATE: &str = "build-time-llvm";
const RUN_TIME_SWIFT_TEMPLATE: &str = "run-time-swift";

/// Download location templates, keyed by template name.
const URL_TEMPLATES: [(&str, &str); 3] = [
    (
        BUILD_TIME_SWIFT_TEMPLATE,
        "https://download.swift.org/{{branch}}/xcode/swift-{{version}}/swift-{{version}}-osx.pkg",
    ),
    (
        BUILD_TIME_LLVM_TEMPLATE,
        "https://github.com/llvm/llvm-project/releases/download/llvmorg-{{llvm}}/clang+llvm-{{llvm}}-{{arch}}-{{host_os}}.tar.xz",
    ),
    (
        RUN_TIME_SWIFT_TEMPLATE,
        "https://download.swift.org/{{branch}}/{{os}}{{os_compact}}{{arch_suffix}}/swift-{{version}}/swift-{{version}}-{{os}}{{os_version}}{{arch_suffix}}.tar.gz",
    ),
];

/// What an artifact contributes to the bundle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum ArtifactRole {
    /// Swift runtime for the build machine (macOS installer package).
    BuildRuntime,
    /// Linker toolchain for the build machine (LLVM release).
    BuildToolchain,
    /// Swift runtime libraries for the run-time platform.
    TargetRuntime,
    /// Distribution package index.
    PackageIndex,
    /// Distribution system library package.
    SystemPackage,
}

/// Packing format of a downloaded artifact.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ArchiveKind {
    /// gzip-compressed tarball.
    TarGz,
    /// xz-compressed tarball.
    TarXz,
    /// Debian package (`ar` archive wrapping compressed tarballs).
    Deb,
    /// macOS installer package (`xar` archive wrapping cpio payloads).
    Pkg,
    /// Single gzip-compressed file.
    Gzip,
}

impl ArchiveKind {
    /// Determines the kind from a file name suffix.
    pub fn from_file_name(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Ok(ArchiveKind::TarGz)
        } else if lower.ends_with(".tar.xz") {
            Ok(ArchiveKind::TarXz)
        } else if lower.ends_with(".deb") {
            Ok(ArchiveKind::Deb)
        } else if lower.ends_with(".pkg") {
            Ok(ArchiveKind::Pkg)
        } else if lower.ends_with(".gz") {
            Ok(ArchiveKind::Gzip)
        } else {
            Err(Error::UnsupportedArchiveFormat(name.to_string()))
        }
    }

    /// Whether this is an OS-native installer format that may need an
    /// isolated environment to unpack.
    pub fn is_installer_package(self) -> bool {
        matches!(self, ArchiveKind::Pkg)
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArchiveKind::TarGz => "tar.gz",
            ArchiveKind::TarXz => "tar.xz",
            ArchiveKind::Deb => "deb",
            ArchiveKind::Pkg => "pkg",
            ArchiveKind::Gzip => "gz",
        })
    }
}

/// One downloadable unit. Immutable once resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArtifactDescriptor {
    id: String,
    role: ArtifactRole,
    remote_url: Url,
    checksum: Option<String>,
    local_path: PathBuf,
    kind: ArchiveKind,
    strip_components: u32,
    members: Vec<String>,
}

impl ArtifactDescriptor {
    /// Describes the artifact at `remote_url`, cached at `local_path`.
    ///
    /// The archive kind is taken from the URL's file name.
    pub fn new(
        id: impl Into<String>,
        role: ArtifactRole,
        remote_url: Url,
        local_path: PathBuf,
    ) -> Result<Self> {
        let file_name = remote_url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .with_context(|| format!("download URL `{remote_url}` has no file name"))?
            .to_string();
        let kind = ArchiveKind::from_file_name(&file_name)?;

        Ok(Self {
            id: id.into(),
            role,
            remote_url,
            checksum: None,
            local_path,
            kind,
            strip_components: 0,
            members: Vec::new(),
        })
    }

    /// Sets the expected SHA-256 (hex).
    pub fn with_checksum(mut self, sha256: impl Into<String>) -> Self {
        self.checksum = Some(sha256.into().to_ascii_lowercase());
        self
    }

    /// Number of leading path components dropped on extraction.
    pub fn with_strip_components(mut self, count: u32) -> Self {
        self.strip_components = count;
        self
    }

    /// Restricts extraction to these paths (after stripping) and their children.
    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members = members.into_iter().map(Into::into).collect();
        self
    }

    /// Stable identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Contribution to the bundle.
    pub fn role(&self) -> ArtifactRole {
        self.role
    }

    /// Fully resolved download location.
    pub fn remote_url(&self) -> &Url {
        &self.remote_url
    }

    /// Expected SHA-256, when the distributor publishes one.
    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    /// Cache location.
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// Packing format.
    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    /// Leading path components dropped on extraction.
    pub fn strip_components(&self) -> u32 {
        self.strip_components
    }

    /// Extraction filter; empty means everything.
    pub fn members(&self) -> &[String] {
        &self.members
    }
}

/// The three components every bundle needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DownloadableArtifacts {
    /// Multi-arch Swift installer package for the build host.
    pub build_time_swift: ArtifactDescriptor,
    /// LLVM release providing `ld.lld` for the build host.
    pub build_time_llvm: ArtifactDescriptor,
    /// Swift runtime libraries for the run-time platform.
    pub run_time_swift: ArtifactDescriptor,
}

impl DownloadableArtifacts {
    /// All descriptors, in a fixed order.
    pub fn to_vec(&self) -> Vec<ArtifactDescriptor> {
        vec![
            self.build_time_swift.clone(),
            self.build_time_llvm.clone(),
            self.run_time_swift.clone(),
        ]
    }
}

/// Download location templates rendered with strict variable checking.
pub(crate) struct UrlTemplates {
    registry: Handlebars<'static>,
}

impl UrlTemplates {
    pub(crate) fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        for (name, template) in URL_TEMPLATES {
            registry
                .register_template_string(name, template)
                .with_context(|| format!("invalid URL template `{name}`"))?;
        }
        Ok(Self { registry })
    }

    pub(crate) fn render(&self, name: &str, data: &serde_json::Value) -> Result<Url> {
        let rendered = self
            .registry
            .render(name, data)
            .map_err(|e| Error::InvalidUrl {
                url: format!("<{name}>"),
                reason: e.to_string(),
            })?;
        Url::parse(&rendered).map_err(|e| Error::InvalidUrl {
            url: rendered.clone(),
            reason: e.to_string(),
        })
    }
}

/// Resolves the three core artifacts.
///
/// Pure: no network or filesystem access. Identical settings always give
/// identical descriptors.
pub fn resolve_artifacts(
    settings: &Settings,
    paths: &PathsConfiguration,
) -> Result<DownloadableArtifacts> {
    let templates = UrlTemplates::new()?;
    let build = settings.build_environment();
    let target = settings.platform_target();
    let version = settings.swift_version().as_str();
    let branch = settings.swift_branch();

    let build_time_swift_url = templates.render(
        BUILD_TIME_SWIFT_TEMPLATE,
        &json!({ "branch": branch, "version": version }),
    )?;

    let llvm = settings.llvm_version().to_string();
    let build_time_llvm_url = templates.render(
        BUILD_TIME_LLVM_TEMPLATE,
        &json!({
            "llvm": llvm,
            "arch": build.arch.name(NamingScheme::VendorOs),
            "host_os": build.os.llvm_os_suffix(),
        }),
    )?;

    let run_time_swift_url = templates.render(
        RUN_TIME_SWIFT_TEMPLATE,
        &json!({
            "branch": branch,
            "version": version,
            "os": target.os_family(),
            "os_compact": target.distribution.compact_version(),
            "os_version": target.distribution.version(),
            "arch_suffix": linux_arch_suffix(target.arch),
        }),
    )?;

    Ok(DownloadableArtifacts {
        build_time_swift: cached_descriptor(
            "build-time-swift",
            ArtifactRole::BuildRuntime,
            build_time_swift_url,
            paths,
        )?,
        build_time_llvm: cached_descriptor(
            "build-time-llvm",
            ArtifactRole::BuildToolchain,
            build_time_llvm_url,
            paths,
        )?
        .with_strip_components(1)
        .with_members(["bin/lld"]),
        run_time_swift: cached_descriptor(
            "run-time-swift",
            ArtifactRole::TargetRuntime,
            run_time_swift_url,
            paths,
        )?
        .with_strip_components(1),
    })
}

/// Swift Linux releases leave x86_64 unmarked and suffix every other
/// architecture with its triple spelling.
fn linux_arch_suffix(arch: Arch) -> String {
    match arch {
        Arch::X86_64 => String::new(),
        other => format!("-{}", other.name(NamingScheme::TargetTriple)),
    }
}

/// Descriptor cached under the URL's host and path, so two locations that
/// share a file name never share a cache entry.
fn cached_descriptor(
    id: &str,
    role: ArtifactRole,
    url: Url,
    paths: &PathsConfiguration,
) -> Result<ArtifactDescriptor> {
    let host = url
        .host_str()
        .with_context(|| format!("download URL `{url}` has no host"))?;
    let local_path = paths.cache_path(&format!("{host}{}", url.path()));
    ArtifactDescriptor::new(id, role, url, local_path)
}
