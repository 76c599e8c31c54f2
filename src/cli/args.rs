//! Command line argument parsing and validation.
//!
//! This module provides CLI argument parsing using clap, with environment
//! variable fallbacks and conversion into validated settings.

use crate::bundler::{
    DEFAULT_EXTRACTION_IMAGE, DEFAULT_LLVM_VERSION, DEFAULT_MAX_ATTEMPTS, DEFAULT_SWIFT_VERSION,
    DEFAULT_UBUNTU_VERSION, RetryConfig, Settings, SettingsBuilder,
};
use clap::Parser;
use path_absolutize::Absolutize;
use std::path::PathBuf;

/// Swift cross-compilation SDK generator
#[derive(Parser, Debug)]
#[command(
    name = "swift_sdk_generator",
    version,
    about = "Generates Swift SDK bundles for cross-compiling from macOS to Ubuntu Linux",
    long_about = "Downloads the Swift runtime, the LLVM linker and the Ubuntu system libraries
for a target platform and assembles them into a Swift SDK artifact bundle.

Usage:
  swift_sdk_generator --target-arch aarch64
  swift_sdk_generator --swift-version 5.8-RELEASE --ubuntu-version 20.04 --with-docker

Exit code 0 = the bundle manifest is guaranteed to exist."
)]
pub struct Args {
    /// Swift release to package
    #[arg(long, env = "SWIFT_SDK_SWIFT_VERSION", default_value = DEFAULT_SWIFT_VERSION)]
    pub swift_version: String,

    /// Download branch directory (default: derived from the release)
    #[arg(long, env = "SWIFT_SDK_SWIFT_BRANCH")]
    pub swift_branch: Option<String>,

    /// LLVM release providing ld.lld
    #[arg(long, env = "SWIFT_SDK_LLD_VERSION", default_value = DEFAULT_LLVM_VERSION)]
    pub lld_version: String,

    /// Ubuntu release of the run-time platform
    #[arg(long, env = "SWIFT_SDK_UBUNTU_VERSION", default_value = DEFAULT_UBUNTU_VERSION)]
    pub ubuntu_version: String,

    /// CPU architecture of the machine running the compiler (default: this machine)
    #[arg(long, env = "SWIFT_SDK_BUILD_ARCH", value_name = "ARCH")]
    pub build_arch: Option<String>,

    /// CPU architecture of the run-time platform (default: --build-arch)
    #[arg(long, env = "SWIFT_SDK_TARGET_ARCH", value_name = "ARCH")]
    pub target_arch: Option<String>,

    /// Unpack installer packages inside a docker container
    #[arg(long)]
    pub with_docker: bool,

    /// Image used with --with-docker
    #[arg(long, env = "SWIFT_SDK_DOCKER_IMAGE", default_value = DEFAULT_EXTRACTION_IMAGE)]
    pub docker_image: String,

    /// Directory receiving Artifacts/, Work/ and Bundles/ (default: current directory)
    #[arg(long, env = "SWIFT_SDK_ROOT", value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Download attempts per artifact
    #[arg(long, env = "SWIFT_SDK_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Do not bundle Ubuntu system libraries into the SDK
    #[arg(long)]
    pub no_system_packages: bool,

    /// Show debug output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Default log filter; `RUST_LOG` still takes precedence.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("--max-attempts must be at least 1".to_string());
        }
        if self.with_docker && self.docker_image.trim().is_empty() {
            return Err("--docker-image cannot be empty with --with-docker".to_string());
        }
        Ok(())
    }

    /// Absolute root directory.
    pub fn resolved_root(&self) -> std::io::Result<PathBuf> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => std::env::current_dir()?,
        };
        Ok(root.absolutize()?.into_owned())
    }

    /// Builds validated settings from the arguments.
    pub fn to_settings(&self) -> crate::Result<Settings> {
        let retry = RetryConfig {
            max_attempts: self.max_attempts,
            ..RetryConfig::default()
        };

        let mut builder = SettingsBuilder::new()
            .swift_version(&self.swift_version)
            .llvm_version(&self.lld_version)
            .ubuntu_version(&self.ubuntu_version)
            .use_docker(self.with_docker)
            .docker_image(&self.docker_image)
            .skip_system_packages(self.no_system_packages)
            .retry(retry)
            .source_root(self.resolved_root()?);

        if let Some(branch) = &self.swift_branch {
            builder = builder.swift_branch(branch);
        }
        if let Some(arch) = &self.build_arch {
            builder = builder.build_arch(arch);
        }
        if let Some(arch) = &self.target_arch {
            builder = builder.target_arch(arch);
        }

        Ok(builder.build()?)
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        let output = super::OutputManager::new(args.verbose, false);
        Self { output }
    }
}

impl RuntimeConfig {
    /// Print verbose message if in verbose mode
    pub fn verbose_println(&self, message: &str) -> std::io::Result<()> {
        self.output.verbose(message)
    }

    /// Print success message if not in quiet mode
    pub fn success(&self, message: &str) -> std::io::Result<()> {
        self.output.success(message)
    }

    /// Print warning message if not in quiet mode
    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        self.output.warn(message)
    }

    /// Print progress message
    pub fn progress(&self, message: &str) -> std::io::Result<()> {
        self.output.progress(message)
    }

    /// Print section header
    pub fn section(&self, title: &str) -> std::io::Result<()> {
        self.output.section(title)
    }

    /// Print indented text
    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        self.output.indent(message)
    }

    /// Print error message
    pub fn error(&self, message: &str) -> std::io::Result<()> {
        self.output.error(message)
    }
}
