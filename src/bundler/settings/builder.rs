//! Builder for constructing Settings.

use super::{
    Arch, BuildEnvironment, HostOs, LlvmVersion, PlatformTarget, RetryConfig, Settings,
    SwiftVersion, UbuntuRelease, core::DEFAULT_EXTRACTION_IMAGE,
};
use crate::bundler::error::Result;
use std::path::{Path, PathBuf};

/// Swift release used when none is given.
pub const DEFAULT_SWIFT_VERSION: &str = "5.8-RELEASE";

/// LLVM release providing `ld.lld` when none is given.
pub const DEFAULT_LLVM_VERSION: &str = "16.0.4";

/// Ubuntu release targeted when none is given.
pub const DEFAULT_UBUNTU_VERSION: &str = "22.04";

/// Builder for constructing [`Settings`].
///
/// Accepts raw strings so that every validation error surfaces from
/// [`SettingsBuilder::build`] with the offending value.
///
/// # Examples
///
/// ```no_run
/// use swift_sdk_generator::bundler::SettingsBuilder;
///
/// # fn example() -> swift_sdk_generator::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .source_root(".")
///     .build_arch("arm64")
///     .target_arch("x86_64")
///     .use_docker(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct SettingsBuilder {
    swift_version: Option<String>,
    swift_branch: Option<String>,
    llvm_version: Option<String>,
    ubuntu_version: Option<String>,
    build_arch: Option<String>,
    target_arch: Option<String>,
    host_os: Option<String>,
    use_docker: bool,
    docker_image: Option<String>,
    skip_system_packages: bool,
    retry: Option<RetryConfig>,
    source_root: Option<PathBuf>,
}

impl SettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the Swift release tag.
    ///
    /// Default: [`DEFAULT_SWIFT_VERSION`]
    pub fn swift_version(mut self, version: impl Into<String>) -> Self {
        self.swift_version = Some(version.into());
        self
    }

    /// Overrides the download branch directory derived from the release.
    pub fn swift_branch(mut self, branch: impl Into<String>) -> Self {
        self.swift_branch = Some(branch.into());
        self
    }

    /// Sets the LLVM release providing the linker.
    ///
    /// Default: [`DEFAULT_LLVM_VERSION`]
    pub fn llvm_version(mut self, version: impl Into<String>) -> Self {
        self.llvm_version = Some(version.into());
        self
    }

    /// Sets the Ubuntu release of the target.
    ///
    /// Default: [`DEFAULT_UBUNTU_VERSION`]
    pub fn ubuntu_version(mut self, version: impl Into<String>) -> Self {
        self.ubuntu_version = Some(version.into());
        self
    }

    /// Sets the build-time architecture, in any naming scheme.
    ///
    /// Default: architecture of the current machine
    pub fn build_arch(mut self, arch: impl Into<String>) -> Self {
        self.build_arch = Some(arch.into());
        self
    }

    /// Sets the run-time architecture, in any naming scheme.
    ///
    /// Default: the build-time architecture
    pub fn target_arch(mut self, arch: impl Into<String>) -> Self {
        self.target_arch = Some(arch.into());
        self
    }

    /// Sets the build host operating system.
    ///
    /// Default: `macos`
    pub fn host_os(mut self, os: impl Into<String>) -> Self {
        self.host_os = Some(os.into());
        self
    }

    /// Unpacks installer packages inside a container.
    pub fn use_docker(mut self, use_docker: bool) -> Self {
        self.use_docker = use_docker;
        self
    }

    /// Sets the image used for container extraction.
    pub fn docker_image(mut self, image: impl Into<String>) -> Self {
        self.docker_image = Some(image.into());
        self
    }

    /// Skips bundling distribution system libraries.
    pub fn skip_system_packages(mut self, skip: bool) -> Self {
        self.skip_system_packages = skip;
        self
    }

    /// Sets the download retry policy.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the directory under which everything is created.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn source_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.source_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Validates every input and builds the settings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unsupported architecture,
    /// host OS or Ubuntu release, an unresolvable Swift or LLVM version,
    /// or a missing `source_root`.
    pub fn build(self) -> Result<Settings> {
        use crate::bundler::error::Context;

        let swift_version =
            SwiftVersion::parse(self.swift_version.as_deref().unwrap_or(DEFAULT_SWIFT_VERSION))?;
        let llvm_version =
            LlvmVersion::parse(self.llvm_version.as_deref().unwrap_or(DEFAULT_LLVM_VERSION))?;
        let distribution = UbuntuRelease::from_version(
            self.ubuntu_version
                .as_deref()
                .unwrap_or(DEFAULT_UBUNTU_VERSION),
        )?;

        let build_arch = match self.build_arch.as_deref() {
            Some(arch) => arch.parse::<Arch>()?,
            None => Arch::host()?,
        };
        let target_arch = match self.target_arch.as_deref() {
            Some(arch) => arch.parse::<Arch>()?,
            None => build_arch,
        };
        let host_os = HostOs::parse(self.host_os.as_deref().unwrap_or("macos"))?;

        let swift_branch = self
            .swift_branch
            .filter(|branch| !branch.trim().is_empty())
            .unwrap_or_else(|| swift_version.branch());

        let mut retry = self.retry.unwrap_or_default();
        retry.max_attempts = retry.max_attempts.max(1);

        Ok(Settings::new(
            swift_version,
            swift_branch,
            llvm_version,
            BuildEnvironment {
                arch: build_arch,
                os: host_os,
            },
            PlatformTarget {
                distribution,
                arch: target_arch,
            },
            self.use_docker,
            self.docker_image
                .unwrap_or_else(|| DEFAULT_EXTRACTION_IMAGE.to_string()),
            !self.skip_system_packages,
            retry,
            self.source_root.context("source_root is required")?,
        ))
    }
}
