//! Cache reuse, integrity checks and retry behavior of the fetcher.

mod common;

use common::MockDownloader;
use std::{path::Path, sync::Arc};
use swift_sdk_generator::bundler::{
    ArtifactDescriptor, ArtifactRole, Error, Fetcher, RetryConfig,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use url::Url;

const CONTENT: &[u8] = b"swift runtime tarball";

fn artifact(root: &Path, checksum: Option<&str>) -> ArtifactDescriptor {
    let descriptor = ArtifactDescriptor::new(
        "run-time-swift",
        ArtifactRole::TargetRuntime,
        Url::parse("https://download.example.org/swift/runtime.tar.gz").unwrap(),
        root.join("Artifacts").join("runtime.tar.gz"),
    )
    .unwrap();
    match checksum {
        Some(sha256) => descriptor.with_checksum(sha256),
        None => descriptor,
    }
}

fn fetcher(downloader: &Arc<MockDownloader>) -> Fetcher {
    Fetcher::new(downloader.clone(), RetryConfig::immediate(3))
}

/// Files left next to the cached artifact.
fn cache_entries(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root.join("Artifacts"))
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn test_download_then_cache_hit() {
    let root = TempDir::new().unwrap();
    let downloader = MockDownloader::new();
    let artifact = artifact(root.path(), Some(&common::sha256(CONTENT)));
    downloader.serve(artifact.remote_url(), CONTENT.to_vec());
    let fetcher = fetcher(&downloader);

    let first = fetcher.fetch(&artifact).await.unwrap();
    assert!(first.transferred);
    assert_eq!(first.bytes, CONTENT.len() as u64);
    assert_eq!(first.path, artifact.local_path());
    assert_eq!(std::fs::read(&first.path).unwrap(), CONTENT);

    let second = fetcher.fetch(&artifact).await.unwrap();
    assert!(!second.transferred);
    assert_eq!(second.bytes, 0);
    assert_eq!(downloader.transfers(), 1);
    assert_eq!(cache_entries(root.path()), ["runtime.tar.gz"]);
}

#[tokio::test]
async fn test_cached_file_without_checksum_is_trusted() {
    let root = TempDir::new().unwrap();
    let downloader = MockDownloader::new();
    let artifact = artifact(root.path(), None);
    common::write(artifact.local_path(), b"anything");

    let outcome = fetcher(&downloader).fetch(&artifact).await.unwrap();
    assert!(!outcome.transferred);
    assert_eq!(downloader.attempts(artifact.remote_url()), 0);
}

#[tokio::test]
async fn test_corrupt_cache_is_downloaded_again() {
    let root = TempDir::new().unwrap();
    let downloader = MockDownloader::new();
    let artifact = artifact(root.path(), Some(&common::sha256(CONTENT)));
    downloader.serve(artifact.remote_url(), CONTENT.to_vec());
    common::write(artifact.local_path(), b"truncated");

    let outcome = fetcher(&downloader).fetch(&artifact).await.unwrap();
    assert!(outcome.transferred);
    assert_eq!(std::fs::read(artifact.local_path()).unwrap(), CONTENT);
}

#[tokio::test]
async fn test_integrity_mismatch_leaves_nothing_behind() {
    let root = TempDir::new().unwrap();
    let downloader = MockDownloader::new();
    let expected = common::sha256(b"something else");
    let artifact = artifact(root.path(), Some(&expected));
    downloader.serve(artifact.remote_url(), CONTENT.to_vec());

    let error = fetcher(&downloader).fetch(&artifact).await.unwrap_err();
    match error {
        Error::IntegrityMismatch {
            artifact: id,
            expected: reported,
            actual,
        } => {
            assert_eq!(id, "run-time-swift");
            assert_eq!(reported, expected);
            assert_eq!(actual, common::sha256(CONTENT));
        }
        other => panic!("expected integrity mismatch, got {other:?}"),
    }
    assert!(cache_entries(root.path()).is_empty());
}

#[tokio::test]
async fn test_checksum_comparison_ignores_case() {
    let root = TempDir::new().unwrap();
    let downloader = MockDownloader::new();
    let artifact = artifact(
        root.path(),
        Some(&common::sha256(CONTENT).to_ascii_uppercase()),
    );
    downloader.serve(artifact.remote_url(), CONTENT.to_vec());

    assert!(fetcher(&downloader).fetch(&artifact).await.unwrap().transferred);
}

#[tokio::test]
async fn test_missing_resource_is_not_retried() {
    let root = TempDir::new().unwrap();
    let downloader = MockDownloader::new();
    let artifact = artifact(root.path(), None);
    downloader.fail_status(artifact.remote_url(), 404);

    let error = fetcher(&downloader).fetch(&artifact).await.unwrap_err();
    assert!(matches!(error, Error::HttpStatus { status: 404, .. }));
    assert!(!error.is_retryable());
    assert_eq!(downloader.attempts(artifact.remote_url()), 1);
    assert!(cache_entries(root.path()).is_empty());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let root = TempDir::new().unwrap();
    let downloader = MockDownloader::new();
    let artifact = artifact(root.path(), Some(&common::sha256(CONTENT)));
    downloader.serve(artifact.remote_url(), CONTENT.to_vec());
    downloader.fail_transient(artifact.remote_url(), 2);

    let outcome = fetcher(&downloader).fetch(&artifact).await.unwrap();
    assert!(outcome.transferred);
    assert_eq!(downloader.attempts(artifact.remote_url()), 3);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let root = TempDir::new().unwrap();
    let downloader = MockDownloader::new();
    let artifact = artifact(root.path(), None);
    downloader.serve(artifact.remote_url(), CONTENT.to_vec());
    downloader.fail_transient(artifact.remote_url(), 10);

    let error = fetcher(&downloader).fetch(&artifact).await.unwrap_err();
    assert!(matches!(error, Error::DownloadFailed { attempts: 3, .. }));
    assert!(error.is_retryable());
    assert_eq!(downloader.attempts(artifact.remote_url()), 3);
    assert!(cache_entries(root.path()).is_empty());
}

#[tokio::test]
async fn test_cancellation_removes_partial_download() {
    let root = TempDir::new().unwrap();
    let downloader = MockDownloader::new();
    let artifact = artifact(root.path(), None);
    downloader.hang(artifact.remote_url());
    let fetcher = fetcher(&downloader);
    let cancel = CancellationToken::new();

    let task = {
        let artifact = artifact.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { fetcher.fetch_with(&artifact, &cancel).await })
    };
    while downloader.attempts(artifact.remote_url()) == 0 {
        tokio::task::yield_now().await;
    }
    cancel.cancel();

    let error = task.await.unwrap().unwrap_err();
    assert!(matches!(error, Error::Cancelled));
    assert!(cache_entries(root.path()).is_empty());
}
