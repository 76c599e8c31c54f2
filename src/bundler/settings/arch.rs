//! CPU architecture types and distributor naming conventions.
//!
//! Swift on macOS, Swift on Linux and Debian packages all spell the same
//! two architectures differently:
//!
//! ```text
//!                     |  X86_64    Arm64
//!    ---------------------------------------
//!    VendorOs         |  x86_64    arm64
//!    TargetTriple     |  x86_64    aarch64
//!    Packaging        |   amd64    arm64
//! ```
//!
//! [`Arch`] is the only stored identifier; every spelling is derived from it.

use crate::bundler::error::{Error, Result};
use std::{fmt, str::FromStr};

/// CPU architecture of a build host or run-time target.
///
/// # Examples
///
/// ```
/// use swift_sdk_generator::bundler::{Arch, NamingScheme};
///
/// let arch: Arch = "aarch64".parse().unwrap();
/// assert_eq!(arch, Arch::Arm64);
/// assert_eq!(arch.name(NamingScheme::VendorOs), "arm64");
/// assert_eq!(arch.name(NamingScheme::Packaging), "arm64");
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Arch {
    /// x86_64 / AMD64 (64-bit)
    X86_64,
    /// AArch64 / ARM64 (64-bit) - Apple Silicon, Graviton, Ampere
    Arm64,
}

/// Architecture spelling convention of a distributor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NamingScheme {
    /// Apple's vendor-OS spelling used by Swift macOS and LLVM darwin releases.
    VendorOs,
    /// Target-OS triple spelling used by Swift Linux releases and triples.
    TargetTriple,
    /// Debian/Ubuntu package architecture spelling.
    Packaging,
}

impl NamingScheme {
    /// All schemes, in table order.
    pub const ALL: [NamingScheme; 3] = [
        NamingScheme::VendorOs,
        NamingScheme::TargetTriple,
        NamingScheme::Packaging,
    ];
}

impl Arch {
    /// All supported architectures.
    pub const ALL: [Arch; 2] = [Arch::X86_64, Arch::Arm64];

    /// Spelling of this architecture under `scheme`.
    pub fn name(self, scheme: NamingScheme) -> &'static str {
        match (self, scheme) {
            (Arch::X86_64, NamingScheme::VendorOs) => "x86_64",
            (Arch::X86_64, NamingScheme::TargetTriple) => "x86_64",
            (Arch::X86_64, NamingScheme::Packaging) => "amd64",
            (Arch::Arm64, NamingScheme::VendorOs) => "arm64",
            (Arch::Arm64, NamingScheme::TargetTriple) => "aarch64",
            (Arch::Arm64, NamingScheme::Packaging) => "arm64",
        }
    }

    /// Parses a spelling that belongs to `scheme` only.
    ///
    /// `"aarch64"` is accepted under [`NamingScheme::TargetTriple`] but not
    /// under [`NamingScheme::VendorOs`].
    pub fn parse_in(scheme: NamingScheme, value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|arch| arch.name(scheme) == value)
            .ok_or_else(|| Error::UnsupportedArchitecture(value.to_string()))
    }

    /// Architecture of the machine running the generator.
    pub fn host() -> Result<Self> {
        match std::env::consts::ARCH {
            "x86_64" => Ok(Arch::X86_64),
            "aarch64" => Ok(Arch::Arm64),
            other => Err(Error::UnsupportedArchitecture(other.to_string())),
        }
    }
}

impl FromStr for Arch {
    type Err = Error;

    /// Accepts the spelling of any naming scheme.
    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        NamingScheme::ALL
            .into_iter()
            .find_map(|scheme| Self::parse_in(scheme, &normalized).ok())
            .ok_or_else(|| Error::UnsupportedArchitecture(value.to_string()))
    }
}

impl fmt::Display for Arch {
    /// Displays the target-triple spelling.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name(NamingScheme::TargetTriple))
    }
}
