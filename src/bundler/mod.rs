//! SDK bundle generation.
//!
//! The pipeline runs in four stages over explicit values:
//!
//! ```text
//! Settings ──► catalog ──► fetch ──► extract ──► assemble ──► info.json
//!              (URLs)      (cache)   (work dirs)  (bundle)
//! ```
//!
//! - [`settings`] - validated inputs, architecture naming, filesystem layout
//! - [`catalog`] - download locations for every artifact
//! - [`fetch`] - cached, verified, retrying downloads
//! - [`extract`] - uniform unpacking of tarballs, Debian and installer packages
//! - [`assemble`] - bundle layout, toolset and manifest files
//! - [`builder`] - the [`Generator`] driving one run end to end

pub mod assemble;
pub mod builder;
pub mod catalog;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod settings;
pub mod utils;

pub use assemble::{ArtifactBundleManifest, Assembler, SwiftSdkMetadata, Toolset};
pub use builder::{GenerationReport, Generator, RunPhase, StateRecord};
pub use catalog::{
    ArchiveKind, ArtifactDescriptor, ArtifactRole, DownloadableArtifacts, resolve_artifacts,
};
pub use error::{Error, ErrorCategory, Result, Stage};
pub use extract::{
    ContainerExtraction, ExtractedComponent, ExtractionEnvironment, Extractor, LocalExtraction,
    UnpackRequest,
};
pub use fetch::{
    FetchOutcome, Fetcher,
    http::{DownloadError, Downloader, HttpDownloader},
};
pub use settings::*;
