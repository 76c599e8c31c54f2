//! Artifact acquisition.
//!
//! [`Fetcher::fetch`] makes sure an artifact exists at its cache path with
//! the expected content:
//!
//! 1. A cached file whose SHA-256 matches (or that has no published digest)
//!    is reused without touching the network.
//! 2. Otherwise the artifact is streamed to `<cache path>.<uuid>.part`,
//!    verified, and renamed into place. The partial file is removed on every
//!    failure path, including cancellation.
//! 3. Transient failures are retried with exponential backoff; a
//!    non-retryable HTTP status fails at once.

pub mod http;

use crate::bundler::{
    builder::checksum,
    catalog::ArtifactDescriptor,
    error::{Error, ErrorExt, Result},
    settings::RetryConfig,
};
use http::{DownloadError, Downloader, HttpDownloader};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;

/// Result of a successful fetch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchOutcome {
    /// Verified file at the artifact's cache path.
    pub path: PathBuf,
    /// Whether a network transfer took place.
    pub transferred: bool,
    /// Bytes transferred; zero on a cache hit.
    pub bytes: u64,
}

/// Downloads artifacts into the cache. Cheap to clone.
#[derive(Clone)]
pub struct Fetcher {
    downloader: Arc<dyn Downloader>,
    retry: RetryConfig,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a fetcher over any transport.
    pub fn new(downloader: Arc<dyn Downloader>, retry: RetryConfig) -> Self {
        Self { downloader, retry }
    }

    /// Creates a fetcher over HTTP.
    pub fn http(retry: RetryConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpDownloader::new()?), retry))
    }

    /// Retry policy in effect.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Fetches `artifact` with no external cancellation.
    pub async fn fetch(&self, artifact: &ArtifactDescriptor) -> Result<FetchOutcome> {
        self.fetch_with(artifact, &CancellationToken::new()).await
    }

    /// Fetches `artifact`, abandoning the transfer once `cancel` fires.
    ///
    /// # Errors
    ///
    /// * [`Error::HttpStatus`] - non-retryable status, not retried
    /// * [`Error::DownloadFailed`] - transient failures exhausted every attempt
    /// * [`Error::IntegrityMismatch`] - the downloaded content has the wrong digest
    /// * [`Error::Cancelled`] - `cancel` fired
    pub async fn fetch_with(
        &self,
        artifact: &ArtifactDescriptor,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        let dest = artifact.local_path();

        if self.is_cached(artifact).await? {
            log::debug!("Cache hit for {} at {}", artifact.id(), dest.display());
            return Ok(FetchOutcome {
                path: dest.to_path_buf(),
                transferred: false,
                bytes: 0,
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .fs_context("creating cache directory", parent)?;
        }

        log::info!("Downloading {} from {}", artifact.id(), artifact.remote_url());
        let partial = PartialDownload::new(dest);
        let bytes = self.download_with_retry(artifact, partial.path(), cancel).await?;

        if let Some(expected) = artifact.checksum() {
            if let Some(actual) = checksum::verify_sha256(partial.path(), expected).await? {
                return Err(Error::IntegrityMismatch {
                    artifact: artifact.id().to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        partial.promote(dest).await?;
        log::info!("✓ Downloaded {} ({} bytes)", artifact.id(), bytes);

        Ok(FetchOutcome {
            path: dest.to_path_buf(),
            transferred: true,
            bytes,
        })
    }

    /// Whether a trustworthy copy is already cached. Corrupt copies are removed.
    async fn is_cached(&self, artifact: &ArtifactDescriptor) -> Result<bool> {
        let dest = artifact.local_path();
        match tokio::fs::metadata(dest).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e).fs_context("inspecting cached artifact", dest),
        }

        let Some(expected) = artifact.checksum() else {
            return Ok(true);
        };
        match checksum::verify_sha256(dest, expected).await? {
            None => Ok(true),
            Some(actual) => {
                log::warn!(
                    "Discarding corrupt cached {} (expected sha256 {}, found {})",
                    artifact.id(),
                    expected,
                    actual
                );
                tokio::fs::remove_file(dest)
                    .await
                    .fs_context("removing corrupt cached artifact", dest)?;
                Ok(false)
            }
        }
    }

    async fn download_with_retry(
        &self,
        artifact: &ArtifactDescriptor,
        temp_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let url = artifact.remote_url();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let reason = match self.downloader.download(url, temp_path, cancel).await {
                Ok(bytes) => return Ok(bytes),
                Err(DownloadError::Cancelled) => return Err(Error::Cancelled),
                Err(DownloadError::Status(status)) => {
                    return Err(Error::HttpStatus {
                        url: url.to_string(),
                        status,
                    });
                }
                Err(DownloadError::Io(error)) => {
                    return Err(Error::Fs {
                        context: "writing download",
                        path: temp_path.to_path_buf(),
                        error,
                    });
                }
                Err(DownloadError::Transient(reason)) => reason,
            };

            if attempt >= max_attempts {
                return Err(Error::DownloadFailed {
                    url: url.to_string(),
                    attempts: attempt,
                    reason,
                });
            }

            let delay = self.retry.backoff(attempt);
            log::warn!(
                "Download of {} failed ({}), retrying in {:?} (attempt {}/{})",
                artifact.id(),
                reason,
                delay,
                attempt + 1,
                max_attempts
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Temporary download file, removed on drop unless promoted.
struct PartialDownload {
    path: PathBuf,
    promoted: bool,
}

impl PartialDownload {
    fn new(dest: &Path) -> Self {
        let mut name = dest.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".{}.part", uuid::Uuid::new_v4()));
        Self {
            path: dest.with_file_name(name),
            promoted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically moves the verified download to its final location.
    async fn promote(mut self, dest: &Path) -> Result<()> {
        tokio::fs::rename(&self.path, dest)
            .await
            .fs_context("moving download into cache", dest)?;
        self.promoted = true;
        Ok(())
    }
}

impl Drop for PartialDownload {
    fn drop(&mut self) {
        if !self.promoted {
            // May not exist if the first attempt failed before writing.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
