//! HTTP transport for artifact downloads.
//!
//! The [`Downloader`] trait is the only contract the fetcher has with the
//! remote distribution services: GET a URL and stream its body into a
//! file. [`HttpDownloader`] is the production implementation on `reqwest`.

use async_trait::async_trait;
use futures_lite::StreamExt;
use std::{path::Path, time::Duration};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Connection establishment timeout.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Longest silence tolerated on an open connection. Transfers themselves are
/// unbounded; toolchain archives are several hundred megabytes.
const READ_TIMEOUT_SECS: u64 = 120;

/// Failure of a single download attempt.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Timeout, reset connection or retryable status; worth another attempt.
    #[error("{0}")]
    Transient(String),

    /// Non-retryable HTTP status.
    #[error("HTTP {0}")]
    Status(u16),

    /// Local write failure.
    #[error("writing download: {0}")]
    Io(#[from] std::io::Error),

    /// The attempt was abandoned.
    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DownloadError::Transient(_))
    }

    /// Maps a non-success status to a transient or structural failure.
    pub fn from_status(status: u16) -> Self {
        if is_transient_status(status) {
            DownloadError::Transient(format!("HTTP {status}"))
        } else {
            DownloadError::Status(status)
        }
    }
}

/// 408, 429 and every 5xx may resolve on their own.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429) || (500..600).contains(&status)
}

/// Retrieves remote content into a local file.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Streams `url` into `dest`, creating or truncating it.
    ///
    /// Returns the number of bytes written. Implementations must stop
    /// promptly with [`DownloadError::Cancelled`] once `cancel` fires.
    async fn download(
        &self,
        url: &Url,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError>;
}

/// [`Downloader`] backed by a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// Creates a downloader with connect and stall timeouts.
    pub fn new() -> crate::bundler::Result<Self> {
        Self::with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Creates a downloader that gives up on a connection after `connect`,
    /// or once no data has arrived for `read`.
    pub fn with_timeouts(connect: Duration, read: Duration) -> crate::bundler::Result<Self> {
        use crate::bundler::error::Context;

        let client = client_builder(connect, read)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

fn client_builder(connect: Duration, read: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(connect)
        .read_timeout(read)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        url: &Url,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            response = self.client.get(url.clone()).send() => {
                response.map_err(|e| DownloadError::Transient(format!("connecting to {url}: {e}")))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::from_status(status.as_u16()));
        }
        if let Some(total) = response.content_length() {
            log::debug!("Downloading {} ({} bytes)", url, total);
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk
                .map_err(|e| DownloadError::Transient(format!("reading body of {url}: {e}")))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}
