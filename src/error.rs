//! Top-level error types for the generator binary.
//!
//! This module defines the errors surfaced to users, with actionable
//! messages and recovery suggestions derived from the failure category.

use crate::bundler::{ErrorCategory, Stage};
use thiserror::Error;

/// Result type alias for generator operations
pub type Result<T> = std::result::Result<T, GeneratorError>;

/// Main error type for all generator operations
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pipeline errors
    #[error("{0}")]
    Generator(#[from] crate::bundler::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },
}

impl GeneratorError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        let error = match self {
            GeneratorError::Generator(error) => error,
            GeneratorError::Cli(_) => {
                return vec!["Run with --help to see the accepted options".to_string()];
            }
            GeneratorError::Io(_) => {
                return vec![
                    "Check that the --root directory is writable and has free space".to_string(),
                ];
            }
        };

        let mut suggestions = match error.category() {
            ErrorCategory::Configuration => vec![
                "Supported architectures: x86_64 (amd64), arm64 (aarch64)".to_string(),
                "Supported Ubuntu releases: 20.04, 22.04".to_string(),
                "Swift versions look like 5.8-RELEASE; LLVM versions like 16.0.4".to_string(),
            ],
            ErrorCategory::Transient => vec![
                "Check your network connection and rerun; completed downloads are kept"
                    .to_string(),
                "Raise --max-attempts for unreliable connections".to_string(),
            ],
            ErrorCategory::Integrity => vec![
                "The cached copy was discarded; rerun to download it again".to_string(),
                "If the mismatch persists the upstream mirror may be serving a stale file"
                    .to_string(),
            ],
            ErrorCategory::Structural => vec![
                "The computed download location does not exist; check --swift-version, \
                 --swift-branch and --lld-version"
                    .to_string(),
            ],
            ErrorCategory::Internal => vec![
                "Rerun with --verbose for details".to_string(),
            ],
        };

        if let crate::bundler::Error::Stage {
            stage: Stage::Extracting,
            ..
        } = error
        {
            suggestions.push(
                "Installer packages need xar and cpio; try --with-docker".to_string(),
            );
        }
        suggestions
    }

    /// Check if rerunning without changes could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            GeneratorError::Generator(error) => error.is_retryable(),
            _ => false,
        }
    }
}
