//! Persisted run state.
//!
//! One JSON record per bundle, rewritten on every phase transition. A
//! record in [`RunPhase::Published`] whose fingerprint matches the current
//! inputs lets the next run return without touching the network.

use crate::bundler::{
    Result,
    error::{Error, ErrorExt, Stage},
    utils::fs,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Phase of a generation run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    /// Inputs validated.
    Configured,
    /// Computing descriptors and resolving system packages.
    Resolving,
    /// Downloading artifacts.
    Fetching,
    /// Unpacking artifacts.
    Extracting,
    /// Building the bundle.
    Assembling,
    /// Manifest written; terminal.
    Published,
    /// A stage failed.
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Configured => "configured",
            RunPhase::Resolving => "resolving",
            RunPhase::Fetching => "fetching",
            RunPhase::Extracting => "extracting",
            RunPhase::Assembling => "assembling",
            RunPhase::Published => "published",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Contents of `state.json`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRecord {
    /// Last phase entered.
    pub phase: RunPhase,
    /// SHA-256 over every input that affects the bundle.
    pub fingerprint: String,
    /// Time of the last transition.
    pub updated_at: DateTime<Utc>,
    /// Stage that failed, for [`RunPhase::Failed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    /// Failure message, for [`RunPhase::Failed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StateRecord {
    /// Loads a record; a missing or unreadable record counts as absent.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).fs_context("reading run state", path),
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                log::warn!("Ignoring unreadable run state {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Whether this record describes a completed run for `fingerprint`.
    pub fn is_published(&self, fingerprint: &str) -> bool {
        self.phase == RunPhase::Published && self.fingerprint == fingerprint
    }

    /// Writes the record atomically.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write_atomic(path, &json).await
    }
}

/// Tracks and persists the phase of the current run.
#[derive(Debug)]
pub struct RunState {
    path: PathBuf,
    fingerprint: String,
    phase: RunPhase,
}

impl RunState {
    /// Starts tracking a run in [`RunPhase::Configured`].
    pub async fn start(path: PathBuf, fingerprint: String) -> Result<Self> {
        let mut state = Self {
            path,
            fingerprint,
            phase: RunPhase::Configured,
        };
        state.persist(None).await?;
        Ok(state)
    }

    /// Current phase.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Moves to `phase` and persists it.
    pub async fn enter(&mut self, phase: RunPhase) -> Result<()> {
        log::debug!("Run phase: {} -> {}", self.phase, phase);
        self.phase = phase;
        self.persist(None).await
    }

    /// Records `error` as the reason the run failed.
    pub async fn fail(&mut self, error: &Error) -> Result<()> {
        let stage = match error {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        };
        self.phase = RunPhase::Failed;
        self.persist(Some((stage, error.to_string()))).await
    }

    async fn persist(&mut self, failure: Option<(Option<Stage>, String)>) -> Result<()> {
        let (failed_stage, error) = match failure {
            Some((stage, message)) => (stage, Some(message)),
            None => (None, None),
        };
        StateRecord {
            phase: self.phase,
            fingerprint: self.fingerprint.clone(),
            updated_at: Utc::now(),
            failed_stage,
            error,
        }
        .save(&self.path)
        .await
    }
}
