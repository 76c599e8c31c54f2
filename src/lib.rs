//! Swift cross-compilation SDK generator library
//!
//! This library generates Swift SDK artifact bundles that let a macOS host
//! compile Swift code for Ubuntu Linux:
//! - resolving download locations for the Swift runtime and LLVM linker
//! - fetching and verifying them into a local cache
//! - unpacking tarballs, Debian packages and macOS installer packages
//! - assembling the bundle and its `info.json` manifest
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod bundler;
pub mod cli;
pub mod error;

// Re-export commonly used types
pub use error::{CliError, GeneratorError, Result};
