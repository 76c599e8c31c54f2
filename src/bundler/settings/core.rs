//! Core Settings struct and implementations.

use super::{
    BuildEnvironment, LlvmVersion, PathsConfiguration, PlatformTarget, RetryConfig, SwiftVersion,
    Triple,
};
use std::path::{Path, PathBuf};

/// Docker image used for isolated extraction unless overridden.
pub const DEFAULT_EXTRACTION_IMAGE: &str = "ubuntu:22.04";

/// Validated configuration for one generation run.
///
/// Constructed via [`SettingsBuilder`](super::SettingsBuilder); once built,
/// every version and architecture has been checked and every path is known.
///
/// # Examples
///
/// ```no_run
/// use swift_sdk_generator::bundler::SettingsBuilder;
///
/// # fn example() -> swift_sdk_generator::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .source_root("/tmp/sdk")
///     .swift_version("5.8-RELEASE")
///     .ubuntu_version("22.04")
///     .build_arch("x86_64")
///     .target_arch("aarch64")
///     .build()?;
///
/// assert_eq!(settings.artifact_id(), "5.8-RELEASE_ubuntu_22.04_aarch64");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Settings {
    swift_version: SwiftVersion,
    swift_branch: String,
    llvm_version: LlvmVersion,
    build: BuildEnvironment,
    target: PlatformTarget,
    use_docker: bool,
    docker_image: String,
    include_system_packages: bool,
    retry: RetryConfig,
    source_root: PathBuf,
}

impl Settings {
    /// Swift release being packaged.
    pub fn swift_version(&self) -> &SwiftVersion {
        &self.swift_version
    }

    /// Download branch directory for the Swift release.
    pub fn swift_branch(&self) -> &str {
        &self.swift_branch
    }

    /// LLVM release providing the linker.
    pub fn llvm_version(&self) -> &LlvmVersion {
        &self.llvm_version
    }

    /// Machine the compiler runs on.
    pub fn build_environment(&self) -> &BuildEnvironment {
        &self.build
    }

    /// Platform generated code runs on.
    pub fn platform_target(&self) -> &PlatformTarget {
        &self.target
    }

    /// Triple of the build host.
    pub fn build_triple(&self) -> Triple {
        self.build.triple()
    }

    /// Triple of the run-time platform.
    pub fn target_triple(&self) -> Triple {
        self.target.triple()
    }

    /// Whether installer packages are unpacked inside a container.
    pub fn use_docker(&self) -> bool {
        self.use_docker
    }

    /// Image used for container extraction.
    pub fn docker_image(&self) -> &str {
        &self.docker_image
    }

    /// Whether distribution system libraries are bundled into the SDK.
    pub fn include_system_packages(&self) -> bool {
        self.include_system_packages
    }

    /// Retry policy for downloads.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Directory under which cache, work and bundle directories live.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Bundle identifier, e.g. `5.8-RELEASE_ubuntu_22.04_aarch64`.
    ///
    /// Depends only on the Swift version, the distribution release and the
    /// run-time architecture.
    pub fn artifact_id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.swift_version,
            self.target.os_family(),
            self.target.distribution.version(),
            self.target.arch,
        )
    }

    /// Filesystem layout for this configuration.
    pub fn paths(&self) -> PathsConfiguration {
        PathsConfiguration::new(&self.source_root, &self.artifact_id(), &self.target)
    }

    /// Stable description of every input that affects the generated bundle.
    pub(crate) fn fingerprint_input(&self) -> serde_json::Value {
        serde_json::json!({
            "swiftVersion": self.swift_version.as_str(),
            "swiftBranch": self.swift_branch,
            "llvmVersion": self.llvm_version.to_string(),
            "buildTriple": self.build_triple().to_string(),
            "targetTriple": self.target_triple().to_string(),
            "ubuntuVersion": self.target.distribution.version(),
            "systemPackages": self.include_system_packages,
        })
    }

    /// Creates a new Settings instance (used by SettingsBuilder).
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        swift_version: SwiftVersion,
        swift_branch: String,
        llvm_version: LlvmVersion,
        build: BuildEnvironment,
        target: PlatformTarget,
        use_docker: bool,
        docker_image: String,
        include_system_packages: bool,
        retry: RetryConfig,
        source_root: PathBuf,
    ) -> Self {
        Self {
            swift_version,
            swift_branch,
            llvm_version,
            build,
            target,
            use_docker,
            docker_image,
            include_system_packages,
            retry,
            source_root,
        }
    }
}
