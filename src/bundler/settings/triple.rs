//! Target triples for the build host and the run-time platform.

use super::{Arch, NamingScheme};
use std::fmt;

/// Minimum macOS version the bundled toolchain targets.
pub const MACOS_DEPLOYMENT_TARGET: &str = "13.0";

/// An `<arch>-<vendor>-<os>[-<environment>]` identifier.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Triple {
    arch: Arch,
    arch_name: &'static str,
    vendor: &'static str,
    os: String,
    environment: Option<&'static str>,
}

impl Triple {
    /// Linux GNU triple, spelled with the target-OS convention
    /// (`aarch64-unknown-linux-gnu`).
    pub fn linux_gnu(arch: Arch) -> Self {
        Self {
            arch,
            arch_name: arch.name(NamingScheme::TargetTriple),
            vendor: "unknown",
            os: "linux".to_string(),
            environment: Some("gnu"),
        }
    }

    /// macOS triple, spelled with the vendor-OS convention
    /// (`arm64-apple-macosx13.0`).
    pub fn macos(arch: Arch) -> Self {
        Self {
            arch,
            arch_name: arch.name(NamingScheme::VendorOs),
            vendor: "apple",
            os: format!("macosx{MACOS_DEPLOYMENT_TARGET}"),
            environment: None,
        }
    }

    /// Architecture component.
    pub fn arch(&self) -> Arch {
        self.arch
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.arch_name, self.vendor, self.os)?;
        if let Some(environment) = self.environment {
            write!(f, "-{environment}")?;
        }
        Ok(())
    }
}
