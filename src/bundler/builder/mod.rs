//! Generation orchestration and coordination.
//!
//! This module provides the main [`Generator`] that coordinates the
//! resolving, fetching, extracting and assembling stages of one run.
//!
//! # Overview
//!
//! The generator:
//! 1. Resolves download locations from [`Settings`](crate::bundler::Settings)
//! 2. Fetches every artifact concurrently into the cache
//! 3. Extracts every artifact concurrently into working directories
//! 4. Assembles the bundle and publishes its manifest
//! 5. Returns a [`GenerationReport`]
//!
//! # Module Organization
//!
//! - [`checksum`] - SHA256 checksum calculation for cached artifacts
//! - [`orchestrator`] - Main [`Generator`] struct and the stage fan-out
//! - [`state`] - Persisted run state record
//! - [`tool_detection`] - External tool availability checking

pub mod checksum;
mod orchestrator;
pub mod state;
pub mod tool_detection;

pub use orchestrator::{GenerationReport, Generator};
pub use state::{RunPhase, StateRecord};
