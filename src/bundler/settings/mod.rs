//! Configuration structures for SDK generation.
//!
//! This module provides the validated inputs of a generation run:
//! architecture naming, release versions, platform descriptions, the
//! retry policy and the filesystem layout derived from them.

mod arch;
mod builder;
mod core;
mod paths;
mod retry;
mod triple;
mod versions;

// Re-export all public types
pub use arch::{Arch, NamingScheme};
pub use builder::{
    DEFAULT_LLVM_VERSION, DEFAULT_SWIFT_VERSION, DEFAULT_UBUNTU_VERSION, SettingsBuilder,
};
pub use core::{DEFAULT_EXTRACTION_IMAGE, Settings};
pub use paths::PathsConfiguration;
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryConfig};
pub use triple::{MACOS_DEPLOYMENT_TARGET, Triple};
pub use versions::{
    BuildEnvironment, HostOs, LlvmVersion, PlatformTarget, SwiftVersion, UbuntuRelease,
};
