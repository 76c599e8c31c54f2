//! Archive extraction.
//!
//! The [`Extractor`] turns a cached artifact into a working directory with
//! a uniform shape, whatever the packing format. How the bytes are actually
//! unpacked is delegated to an [`ExtractionEnvironment`]:
//!
//! - [`LocalExtraction`] unpacks in-process (tarballs, Debian packages) or
//!   with host tools (`xar` + `cpio` for installer packages)
//! - [`ContainerExtraction`] delegates to a throwaway docker container
//!
//! Installer packages are routed to the installer environment, everything
//! else to the local one. A failed extraction never leaves a partially
//! populated working directory behind.

pub mod container;
pub mod local;

pub use container::ContainerExtraction;
pub use local::LocalExtraction;

use crate::bundler::{
    catalog::{ArchiveKind, ArtifactDescriptor, ArtifactRole},
    error::{Error, Result},
    settings::Settings,
    utils::fs,
};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// What to unpack and where.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnpackRequest {
    /// Archive on disk.
    pub archive: PathBuf,
    /// Packing format.
    pub kind: ArchiveKind,
    /// Existing, empty directory receiving the content.
    pub destination: PathBuf,
    /// Leading path components dropped from every entry.
    pub strip_components: u32,
    /// Paths (after stripping) to keep; empty keeps everything.
    pub members: Vec<String>,
}

impl UnpackRequest {
    /// Request for a cataloged artifact.
    pub fn for_artifact(artifact: &ArtifactDescriptor, destination: &Path) -> Self {
        Self {
            archive: artifact.local_path().to_path_buf(),
            kind: artifact.kind(),
            destination: destination.to_path_buf(),
            strip_components: artifact.strip_components(),
            members: artifact.members().to_vec(),
        }
    }

    /// Whether `relative` (already stripped) passes the member filter.
    pub fn keeps(&self, relative: &Path) -> bool {
        self.members.is_empty()
            || self
                .members
                .iter()
                .any(|member| relative.starts_with(member.trim_end_matches('/')))
    }
}

/// Capability to unpack an archive into a directory.
#[async_trait]
pub trait ExtractionEnvironment: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Unpacks `request.archive` into `request.destination`.
    ///
    /// Must return [`Error::UnsupportedArchiveFormat`] for kinds it cannot
    /// handle and [`Error::Cancelled`] promptly once `cancel` fires.
    async fn unpack(&self, request: &UnpackRequest, cancel: &CancellationToken) -> Result<()>;
}

/// A successfully unpacked artifact.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExtractedComponent {
    /// Artifact identifier.
    pub id: String,
    /// Contribution to the bundle.
    pub role: ArtifactRole,
    /// Working directory holding the unpacked content.
    pub root: PathBuf,
}

/// Routes artifacts to an extraction environment. Cheap to clone.
#[derive(Clone)]
pub struct Extractor {
    local: Arc<dyn ExtractionEnvironment>,
    installer: Arc<dyn ExtractionEnvironment>,
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("local", &self.local.name())
            .field("installer", &self.installer.name())
            .finish()
    }
}

impl Extractor {
    /// Uses `local` for ordinary archives and `installer` for installer packages.
    pub fn new(
        local: Arc<dyn ExtractionEnvironment>,
        installer: Arc<dyn ExtractionEnvironment>,
    ) -> Self {
        Self { local, installer }
    }

    /// Unpacks everything on the host.
    pub fn local() -> Self {
        let local: Arc<dyn ExtractionEnvironment> = Arc::new(LocalExtraction);
        Self::new(local.clone(), local)
    }

    /// Host extraction, with installer packages in a container when enabled.
    pub fn for_settings(settings: &Settings) -> Self {
        if settings.use_docker() {
            Self::new(
                Arc::new(LocalExtraction),
                Arc::new(ContainerExtraction::new(settings.docker_image())),
            )
        } else {
            Self::local()
        }
    }

    /// Environment that will handle `kind`.
    pub fn environment_for(&self, kind: ArchiveKind) -> &dyn ExtractionEnvironment {
        if kind.is_installer_package() {
            self.installer.as_ref()
        } else {
            self.local.as_ref()
        }
    }

    /// Extracts `artifact` into `destination` with no external cancellation.
    pub async fn extract(
        &self,
        artifact: &ArtifactDescriptor,
        destination: &Path,
    ) -> Result<ExtractedComponent> {
        self.extract_with(artifact, destination, &CancellationToken::new())
            .await
    }

    /// Extracts `artifact` into a freshly emptied `destination`.
    ///
    /// # Errors
    ///
    /// * [`Error::UnsupportedArchiveFormat`] - the environment has no strategy for the kind
    /// * [`Error::ExtractionFailed`] - unpacking did not complete; `destination` is removed
    /// * [`Error::Cancelled`] - `cancel` fired; `destination` is removed
    pub async fn extract_with(
        &self,
        artifact: &ArtifactDescriptor,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<ExtractedComponent> {
        let request = UnpackRequest::for_artifact(artifact, destination);
        let environment = self.environment_for(request.kind);
        log::info!(
            "Extracting {} ({}, {})",
            artifact.id(),
            request.kind,
            environment.name()
        );

        fs::create_dir_all(destination, true).await?;

        match environment.unpack(&request, cancel).await {
            Ok(()) => {
                log::info!("✓ Extracted {}", artifact.id());
                Ok(ExtractedComponent {
                    id: artifact.id().to_string(),
                    role: artifact.role(),
                    root: destination.to_path_buf(),
                })
            }
            Err(error) => {
                if let Err(cleanup) = fs::remove_dir_all(destination).await {
                    log::warn!(
                        "Failed to remove partial extraction {}: {}",
                        destination.display(),
                        cleanup
                    );
                }
                Err(match error {
                    Error::Cancelled | Error::UnsupportedArchiveFormat(_) => error,
                    other => Error::ExtractionFailed {
                        path: request.archive,
                        source: Box::new(other),
                    },
                })
            }
        }
    }
}

/// Runs an external command to completion, killing it once `cancel` fires.
///
/// Standard output is logged at debug level; standard error is returned in
/// the failure message.
pub(crate) async fn run_command(
    mut command: Command,
    display: String,
    cancel: &CancellationToken,
) -> Result<()> {
    log::debug!("Running {}", display);
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| Error::CommandFailed {
        command: display.clone(),
        reason: e.to_string(),
    })?;

    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        output = child.wait_with_output() => output.map_err(|e| Error::CommandFailed {
            command: display.clone(),
            reason: e.to_string(),
        })?,
    };

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        log::debug!("  {}", line);
    }

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::CommandFailed {
            command: display,
            reason: format!("{} ({})", output.status, stderr.trim()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_filter_matches_whole_components() {
        let request = UnpackRequest {
            archive: PathBuf::from("llvm.tar.xz"),
            kind: ArchiveKind::TarXz,
            destination: PathBuf::from("out"),
            strip_components: 1,
            members: vec!["bin/lld".to_string()],
        };
        assert!(request.keeps(Path::new("bin/lld")));
        assert!(!request.keeps(Path::new("bin/lld-link")));
        assert!(!request.keeps(Path::new("bin/clang")));

        let everything = UnpackRequest {
            members: Vec::new(),
            ..request
        };
        assert!(everything.keeps(Path::new("bin/clang")));
    }
}
