//! External tool detection and availability checking.
//!
//! Installer packages are unpacked with `xar` and `cpio`; isolated
//! extraction needs `docker`. Each lookup runs once per process.

use std::sync::LazyLock;

/// Check if xar is available for unpacking installer packages.
pub static HAS_XAR: LazyLock<bool> = LazyLock::new(|| detect("xar", "--version"));

/// Check if cpio is available for unpacking installer payloads.
pub static HAS_CPIO: LazyLock<bool> = LazyLock::new(|| detect("cpio", "--version"));

/// Check if docker is available for isolated extraction.
pub static HAS_DOCKER: LazyLock<bool> = LazyLock::new(|| detect("docker", "--version"));

/// Looks `tool` up in PATH and checks that it executes.
fn detect(tool: &str, version_flag: &str) -> bool {
    match which::which(tool) {
        Ok(path) => {
            log::debug!("Found {} at: {}", tool, path.display());

            match std::process::Command::new(&path).arg(version_flag).output() {
                Ok(output) if output.status.success() => {
                    let version = String::from_utf8_lossy(&output.stdout);
                    let first_line = version.lines().next().unwrap_or_default();
                    log::debug!("✓ {} available: {}", tool, first_line.trim());
                    true
                }
                // bsdtar-based xar prints its version to stderr and may exit non-zero
                Ok(output) if !output.stderr.is_empty() || !output.stdout.is_empty() => {
                    log::debug!("✓ {} available at {}", tool, path.display());
                    true
                }
                Ok(output) => {
                    log::warn!(
                        "{} found at {} but {} check failed (exit code: {:?})",
                        tool,
                        path.display(),
                        version_flag,
                        output.status.code()
                    );
                    false
                }
                Err(e) => {
                    log::warn!(
                        "{} found at {} but failed to execute: {}. Check file permissions.",
                        tool,
                        path.display(),
                        e
                    );
                    false
                }
            }
        }
        Err(e) => {
            log::debug!("{} not found in PATH: {}", tool, e);
            false
        }
    }
}
