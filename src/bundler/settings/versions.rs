//! Release versions and platform descriptions.
//!
//! Every type here is validated at construction time so that a
//! misconfigured run fails before the first network request.

use super::{Arch, Triple};
use crate::bundler::error::{Error, Result};
use regex::Regex;
use std::fmt;

const SWIFT_RELEASE_PATTERN: &str = r"^(\d+)\.(\d+)(?:\.(\d+))?-RELEASE$";

/// A Swift release such as `5.8-RELEASE` or `5.8.1-RELEASE`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SwiftVersion {
    raw: String,
    major: u64,
    minor: u64,
    patch: Option<u64>,
}

impl SwiftVersion {
    /// Parses a release tag, failing with [`Error::UnresolvableVersion`].
    pub fn parse(value: &str) -> Result<Self> {
        let unresolvable = || Error::UnresolvableVersion {
            component: "Swift",
            version: value.to_string(),
        };

        let pattern = Regex::new(SWIFT_RELEASE_PATTERN)
            .map_err(|e| Error::GenericError(format!("invalid release pattern: {e}")))?;
        let captures = pattern.captures(value).ok_or_else(unresolvable)?;

        let number = |index: usize| -> Result<Option<u64>> {
            captures
                .get(index)
                .map(|m| m.as_str().parse::<u64>().map_err(|_| unresolvable()))
                .transpose()
        };

        Ok(Self {
            raw: value.to_string(),
            major: number(1)?.ok_or_else(unresolvable)?,
            minor: number(2)?.ok_or_else(unresolvable)?,
            patch: number(3)?,
        })
    }

    /// The release tag as given (`5.8-RELEASE`).
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Download branch directory (`swift-5.8-release`).
    pub fn branch(&self) -> String {
        format!("swift-{}", self.raw.to_ascii_lowercase())
    }

    /// `(major, minor, patch)` components.
    pub fn components(&self) -> (u64, u64, Option<u64>) {
        (self.major, self.minor, self.patch)
    }
}

impl fmt::Display for SwiftVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// An LLVM release providing `ld.lld` for the build host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LlvmVersion(semver::Version);

impl LlvmVersion {
    /// Parses a strict `MAJOR.MINOR.PATCH` release number.
    pub fn parse(value: &str) -> Result<Self> {
        let version = semver::Version::parse(value).map_err(|_| Error::UnresolvableVersion {
            component: "LLVM",
            version: value.to_string(),
        })?;
        if !version.pre.is_empty() || !version.build.is_empty() {
            return Err(Error::UnresolvableVersion {
                component: "LLVM",
                version: value.to_string(),
            });
        }
        Ok(Self(version))
    }
}

impl fmt::Display for LlvmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A supported Ubuntu LTS release and the toolchain packages it ships.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UbuntuRelease {
    version: &'static str,
    codename: &'static str,
    gcc_major: u32,
    icu_major: u32,
}

const UBUNTU_RELEASES: [UbuntuRelease; 2] = [
    UbuntuRelease {
        version: "20.04",
        codename: "focal",
        gcc_major: 9,
        icu_major: 66,
    },
    UbuntuRelease {
        version: "22.04",
        codename: "jammy",
        gcc_major: 12,
        icu_major: 70,
    },
];

impl UbuntuRelease {
    /// Looks up a release by its version number.
    pub fn from_version(version: &str) -> Result<Self> {
        UBUNTU_RELEASES
            .iter()
            .copied()
            .find(|release| release.version == version)
            .ok_or_else(|| Error::UnknownUbuntuVersion(version.to_string()))
    }

    /// Version number (`22.04`).
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Version without the dot, as used in download directories (`2204`).
    pub fn compact_version(&self) -> String {
        self.version.replace('.', "")
    }

    /// Release codename (`jammy`).
    pub fn codename(&self) -> &'static str {
        self.codename
    }

    /// Major version of the GCC runtime packages.
    pub fn gcc_major(&self) -> u32 {
        self.gcc_major
    }

    /// Major version of the ICU runtime package.
    pub fn icu_major(&self) -> u32 {
        self.icu_major
    }
}

/// Operating system of the machine running the compiler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostOs {
    /// macOS; LLVM publishes darwin22 binaries for it.
    MacOs,
}

impl HostOs {
    /// Parses a host OS name.
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "macos" | "macosx" | "darwin" => Ok(HostOs::MacOs),
            _ => Err(Error::UnsupportedHostOs(value.to_string())),
        }
    }

    /// OS component of LLVM release asset names.
    pub fn llvm_os_suffix(&self) -> &'static str {
        match self {
            HostOs::MacOs => "apple-darwin22.0",
        }
    }
}

/// The machine the compiler itself runs on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BuildEnvironment {
    /// Build-time CPU architecture.
    pub arch: Arch,
    /// Host operating system.
    pub os: HostOs,
}

impl BuildEnvironment {
    /// Triple of the build host.
    pub fn triple(&self) -> Triple {
        match self.os {
            HostOs::MacOs => Triple::macos(self.arch),
        }
    }
}

/// The platform generated code runs on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PlatformTarget {
    /// Distribution release.
    pub distribution: UbuntuRelease,
    /// Run-time CPU architecture.
    pub arch: Arch,
}

impl PlatformTarget {
    /// OS family name used in bundle identifiers.
    pub fn os_family(&self) -> &'static str {
        "ubuntu"
    }

    /// Triple of the run-time platform.
    pub fn triple(&self) -> Triple {
        Triple::linux_gnu(self.arch)
    }
}
