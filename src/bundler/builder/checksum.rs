//! Artifact checksum calculation.
//!
//! SHA-256 of cached downloads, compared against the digests published by
//! the distributors.

use crate::bundler::{Result, error::ErrorExt};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Calculates the SHA-256 of a file.
///
/// Reads the file in 64KB chunks so large toolchain archives are never
/// held in memory.
///
/// # Arguments
///
/// * `path` - File to hash
///
/// # Returns
///
/// * `Ok(String)` - Lowercase hex digest (64 characters)
/// * `Err` - If the file cannot be opened or read
pub async fn calculate_sha256(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .fs_context("opening file for hashing", path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .fs_context("reading file for hash calculation", path)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compares a file against an expected digest.
///
/// # Returns
///
/// * `Ok(None)` - The digest matches
/// * `Ok(Some(actual))` - The digest differs; `actual` is what was computed
pub async fn verify_sha256(path: &Path, expected: &str) -> Result<Option<String>> {
    let actual = calculate_sha256(path).await?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(None)
    } else {
        Ok(Some(actual))
    }
}
