//! Error types for SDK generation.
//!
//! Every failure in the pipeline is one of these variants. The
//! [`Error::category`] classification separates configuration mistakes
//! from transient network trouble, integrity failures and structural
//! problems (wrong URLs, broken archives).

use std::{
    fmt::Display,
    path::{Path, PathBuf},
};
use thiserror::Error as DeriveError;

/// Result type for SDK generation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage in which a failure occurred.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Computing artifact descriptors and package lists.
    Resolving,
    /// Downloading artifacts into the cache.
    Fetching,
    /// Unpacking archives into working directories.
    Extracting,
    /// Arranging the bundle and writing metadata.
    Assembling,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Resolving => "resolving",
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::Assembling => "assembling",
        };
        f.write_str(name)
    }
}

/// Broad classification of an [`Error`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    /// Invalid input detected before any side effect.
    Configuration,
    /// Network trouble that may go away on its own.
    Transient,
    /// Checksum mismatch or unexpected archive contents.
    Integrity,
    /// A computed location does not exist or an archive cannot be unpacked.
    Structural,
    /// Local I/O, serialization or runtime failures.
    Internal,
}

/// Errors produced while generating an SDK bundle.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// Architecture outside the supported set.
    #[error("CPU architecture `{0}` is not supported by this generator")]
    UnsupportedArchitecture(String),

    /// Ubuntu release without a known codename.
    #[error("Ubuntu Linux version `{0}` is not supported by this generator")]
    UnknownUbuntuVersion(String),

    /// Build host OS other than macOS.
    #[error("host operating system `{0}` is not supported by this generator")]
    UnsupportedHostOs(String),

    /// Version string that does not match a release naming pattern.
    #[error("{component} version `{version}` does not match a recognized release pattern")]
    UnresolvableVersion {
        /// Component the version belongs to (`Swift`, `LLVM`).
        component: &'static str,
        /// The offending version string.
        version: String,
    },

    /// Rendered download location is not a valid URL.
    #[error("invalid download URL `{url}`: {reason}")]
    InvalidUrl {
        /// Rendered URL text.
        url: String,
        /// Parser or template failure.
        reason: String,
    },

    /// Non-retryable HTTP status, usually a wrongly computed URL.
    #[error("HTTP {status} for `{url}`; the computed download location does not exist")]
    HttpStatus {
        /// URL that was requested.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Transient network failures persisted through every retry.
    #[error("download of `{url}` failed after {attempts} attempt(s): {reason}")]
    DownloadFailed {
        /// URL that was requested.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last failure observed.
        reason: String,
    },

    /// Downloaded content does not match the expected SHA-256.
    #[error("integrity check failed for `{artifact}`: expected sha256 {expected}, got {actual}")]
    IntegrityMismatch {
        /// Artifact identifier.
        artifact: String,
        /// Expected digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },

    /// Archive kind the extractor has no strategy for.
    #[error("unsupported archive format: {0}")]
    UnsupportedArchiveFormat(String),

    /// Unpacking did not complete.
    #[error("failed to extract {}: {source}", path.display())]
    ExtractionFailed {
        /// Archive that was being unpacked.
        path: PathBuf,
        /// Underlying failure.
        source: Box<Error>,
    },

    /// Archive entry that would be written outside the extraction directory.
    #[error("`{entry}` in {} resolves outside the extraction directory", archive.display())]
    UnsafeArchiveEntry {
        /// Archive being unpacked.
        archive: PathBuf,
        /// Entry path after stripping.
        entry: String,
    },

    /// Required system package missing from the distribution index.
    #[error("package `{package}` not found in {index}")]
    PackageNotFound {
        /// Package name.
        package: String,
        /// Index URL that was searched.
        index: String,
    },

    /// Extracted content lacks files the bundle requires.
    #[error("`{artifact}` does not contain required path `{path}`")]
    MissingContent {
        /// Artifact identifier.
        artifact: String,
        /// Relative path that was expected.
        path: String,
    },

    /// External command exited unsuccessfully.
    #[error("`{command}` failed: {reason}")]
    CommandFailed {
        /// Command line that was run.
        command: String,
        /// Exit status or captured stderr.
        reason: String,
    },

    /// Failure attributed to a pipeline stage and artifact.
    #[error("{stage} failed for `{artifact}` ({location}): {source}")]
    Stage {
        /// Stage that failed.
        stage: Stage,
        /// Artifact identifier.
        artifact: String,
        /// Resolved URL or local path of the artifact.
        location: String,
        /// Underlying failure.
        source: Box<Error>,
    },

    /// Work stopped because a sibling task failed.
    #[error("operation cancelled")]
    Cancelled,

    /// Filesystem operation failed on a known path.
    #[error("{context} {}: {error}", path.display())]
    Fs {
        /// What was being done.
        context: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        error: std::io::Error,
    },

    /// Free-form error message.
    #[error("{0}")]
    GenericError(String),

    /// I/O error without path context.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory traversal error.
    #[error("directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Path prefix mismatch while computing relative paths.
    #[error("path error: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    /// Background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    /// Classifies this error according to the generator's failure taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnsupportedArchitecture(_)
            | Error::UnknownUbuntuVersion(_)
            | Error::UnsupportedHostOs(_)
            | Error::UnresolvableVersion { .. }
            | Error::InvalidUrl { .. } => ErrorCategory::Configuration,
            Error::DownloadFailed { .. } => ErrorCategory::Transient,
            Error::IntegrityMismatch { .. }
            | Error::UnsupportedArchiveFormat(_)
            | Error::UnsafeArchiveEntry { .. }
            | Error::MissingContent { .. } => ErrorCategory::Integrity,
            Error::HttpStatus { .. }
            | Error::ExtractionFailed { .. }
            | Error::PackageNotFound { .. } => ErrorCategory::Structural,
            Error::Stage { source, .. } => source.category(),
            _ => ErrorCategory::Internal,
        }
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Innermost error, looking through stage and extraction wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Stage { source, .. } | Error::ExtractionFailed { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }

    /// Attributes this error to a stage and artifact.
    pub fn in_stage(self, stage: Stage, artifact: &str, location: impl Display) -> Self {
        match self {
            // Already attributed, or a cancelled sibling.
            Error::Stage { .. } | Error::Cancelled => self,
            other => Error::Stage {
                stage,
                artifact: artifact.to_string(),
                location: location.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Attaches a message to missing values and foreign errors.
pub trait Context<T> {
    /// Converts into a [`Result`] carrying `context` on failure.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Like [`Context::context`], with a lazily built message.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

impl<T, E> Context<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::GenericError(format!("{context}: {e}")))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::GenericError(format!("{}: {e}", f())))
    }
}

/// Adds filesystem context to I/O results.
pub trait ErrorExt<T> {
    /// Wraps an I/O error with what was being done and to which path.
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.as_ref().to_path_buf(),
            error,
        })
    }
}

/// Returns early with a [`Error::GenericError`] built from a format string.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::bundler::Error::GenericError(format!($($arg)*)))
    };
}
