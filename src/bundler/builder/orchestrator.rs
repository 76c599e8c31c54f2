//! Main generation orchestration and coordination.
//!
//! This module provides the [`Generator`] that drives one run through
//! resolving, fetching, extracting and assembling, persisting its phase in
//! the run state record as it goes.

use super::state::{RunPhase, RunState, StateRecord};
use crate::bundler::{
    Result,
    assemble::Assembler,
    catalog::{
        self, ArtifactDescriptor, DownloadableArtifacts,
        ubuntu::{self, PackageIndex},
    },
    error::{Context, Error, Stage},
    extract::{ExtractedComponent, Extractor},
    fetch::Fetcher,
    settings::{PathsConfiguration, Settings},
    utils::fs,
};
use sha2::{Digest, Sha256};
use std::{future::Future, path::PathBuf};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Summary of a completed run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GenerationReport {
    /// Bundle identifier.
    pub artifact_id: String,
    /// `<root>/Bundles/<id>.artifactbundle`
    pub bundle_path: PathBuf,
    /// Published manifest.
    pub manifest_path: PathBuf,
    /// Number of artifacts downloaded during this run.
    pub transferred: usize,
    /// Whether a previous run with identical inputs was reused as is.
    pub up_to_date: bool,
}

/// Drives SDK bundle generation.
///
/// # Examples
///
/// ```no_run
/// use swift_sdk_generator::bundler::{Generator, SettingsBuilder};
///
/// # async fn example() -> swift_sdk_generator::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .source_root("/tmp/sdk")
///     .target_arch("aarch64")
///     .build()?;
///
/// let report = Generator::new(settings)?.generate().await?;
/// println!("Bundle at {}", report.bundle_path.display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Generator {
    settings: Settings,
    paths: PathsConfiguration,
    fetcher: Fetcher,
    extractor: Extractor,
    assembler: Assembler,
}

impl Generator {
    /// Creates a generator downloading over HTTP.
    ///
    /// # Arguments
    ///
    /// * `settings` - Validated configuration from `SettingsBuilder`
    pub fn new(settings: Settings) -> Result<Self> {
        let fetcher = Fetcher::http(*settings.retry())?;
        let extractor = Extractor::for_settings(&settings);
        Ok(Self::with_parts(settings, fetcher, extractor))
    }

    /// Creates a generator from explicit collaborators.
    pub fn with_parts(settings: Settings, fetcher: Fetcher, extractor: Extractor) -> Self {
        Self {
            paths: settings.paths(),
            assembler: Assembler::new(&settings),
            settings,
            fetcher,
            extractor,
        }
    }

    /// Configuration of this run.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Filesystem layout of this run.
    pub fn paths(&self) -> &PathsConfiguration {
        &self.paths
    }

    /// Resolves the three core artifacts without side effects.
    pub fn downloadable_artifacts(&self) -> Result<DownloadableArtifacts> {
        catalog::resolve_artifacts(&self.settings, &self.paths)
    }

    /// Runs the pipeline to a published bundle.
    ///
    /// Returns immediately when the state record shows a published bundle
    /// for identical inputs and its manifest still exists. Otherwise every
    /// stage runs, with cached artifacts reused by the fetcher.
    ///
    /// # Errors
    ///
    /// The first failure, attributed to its stage and artifact. No manifest
    /// exists at the output path afterwards.
    pub async fn generate(&self) -> Result<GenerationReport> {
        let artifact_id = self.settings.artifact_id();
        let artifacts = self
            .downloadable_artifacts()
            .map_err(|e| e.in_stage(Stage::Resolving, &artifact_id, self.paths.source_root().display()))?;
        let fingerprint = self.fingerprint(&artifacts)?;

        let state_path = self.paths.state_path();
        let manifest_path = self.paths.manifest_path();
        if let Some(record) = StateRecord::load(&state_path).await? {
            if record.is_published(&fingerprint) && manifest_path.is_file() {
                log::info!("✓ {} is up to date", artifact_id);
                return Ok(self.report(manifest_path, 0, true));
            }
        }

        fs::create_dir_all(self.paths.work_path(), false).await?;
        let mut state = RunState::start(state_path, fingerprint).await?;

        match self.run(&mut state, artifacts).await {
            Ok(report) => Ok(report),
            Err(error) => {
                log::error!("Generation failed during {}: {}", state.phase(), error);
                if let Err(e) = self.assembler.invalidate().await {
                    log::warn!("Failed to remove manifest after failure: {}", e);
                }
                if let Err(e) = state.fail(&error).await {
                    log::warn!("Failed to record run failure: {}", e);
                }
                Err(error)
            }
        }
    }

    async fn run(
        &self,
        state: &mut RunState,
        artifacts: DownloadableArtifacts,
    ) -> Result<GenerationReport> {
        let artifact_id = self.settings.artifact_id();
        let mut transferred = 0;

        state.enter(RunPhase::Resolving).await?;
        let mut descriptors = artifacts.to_vec();
        if self.settings.include_system_packages() {
            let (packages, index_transferred) = self.resolve_system_packages().await?;
            transferred += usize::from(index_transferred);
            descriptors.extend(packages);
        }
        log::info!("Resolved {} artifacts for {}", descriptors.len(), artifact_id);

        state.enter(RunPhase::Fetching).await?;
        let fetcher = self.fetcher.clone();
        let outcomes = fan_out(Stage::Fetching, descriptors.clone(), move |artifact, cancel| {
            let fetcher = fetcher.clone();
            async move { fetcher.fetch_with(&artifact, &cancel).await }
        })
        .await?;
        transferred += outcomes.iter().filter(|outcome| outcome.transferred).count();

        state.enter(RunPhase::Extracting).await?;
        let extractor = self.extractor.clone();
        let paths = self.paths.clone();
        let components: Vec<ExtractedComponent> =
            fan_out(Stage::Extracting, descriptors, move |artifact, cancel| {
                let extractor = extractor.clone();
                let destination = paths.extraction_path(artifact.id());
                async move {
                    extractor
                        .extract_with(&artifact, &destination, &cancel)
                        .await
                }
            })
            .await?;

        state.enter(RunPhase::Assembling).await?;
        let manifest_path = self.assembler.assemble(&components).await.map_err(|e| {
            e.in_stage(
                Stage::Assembling,
                &artifact_id,
                self.paths.artifact_bundle_path().display(),
            )
        })?;

        state.enter(RunPhase::Published).await?;
        log::info!(
            "✓ Generated {} ({} artifacts downloaded)",
            artifact_id,
            transferred
        );
        Ok(self.report(manifest_path, transferred, false))
    }

    /// Fetches the package index and resolves every required `.deb`.
    ///
    /// Returns the descriptors and whether the index was downloaded.
    async fn resolve_system_packages(&self) -> Result<(Vec<ArtifactDescriptor>, bool)> {
        let index_artifact = ubuntu::package_index_artifact(&self.settings, &self.paths)
            .map_err(|e| e.in_stage(Stage::Resolving, ubuntu::PACKAGE_INDEX_ID, "package index"))?;
        let attribute = |e: Error| {
            e.in_stage(
                Stage::Resolving,
                index_artifact.id(),
                index_artifact.remote_url(),
            )
        };

        let outcome = self.fetcher.fetch(&index_artifact).await.map_err(attribute)?;
        let index = PackageIndex::load(&outcome.path).await.map_err(attribute)?;
        log::debug!("Package index lists {} packages", index.len());

        let packages =
            ubuntu::resolve_packages(&index, &self.settings, &self.paths).map_err(attribute)?;
        Ok((packages, outcome.transferred))
    }

    /// SHA-256 over the configuration and every resolved download location.
    fn fingerprint(&self, artifacts: &DownloadableArtifacts) -> Result<String> {
        let urls: Vec<String> = artifacts
            .to_vec()
            .iter()
            .map(|artifact| artifact.remote_url().to_string())
            .collect();
        let input = serde_json::json!({
            "settings": self.settings.fingerprint_input(),
            "artifacts": urls,
        });
        let bytes = serde_json::to_vec(&input)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    fn report(&self, manifest_path: PathBuf, transferred: usize, up_to_date: bool) -> GenerationReport {
        GenerationReport {
            artifact_id: self.settings.artifact_id(),
            bundle_path: self.paths.artifact_bundle_path().to_path_buf(),
            manifest_path,
            transferred,
            up_to_date,
        }
    }
}

/// Runs `task` for every artifact concurrently, failing fast.
///
/// On the first failure the shared token is cancelled and the remaining
/// tasks are drained, so their cleanup completes before the error is
/// returned. Results keep the order of `artifacts`.
async fn fan_out<T, F, Fut>(stage: Stage, artifacts: Vec<ArtifactDescriptor>, task: F) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(ArtifactDescriptor, CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    let count = artifacts.len();

    for (index, artifact) in artifacts.into_iter().enumerate() {
        let id = artifact.id().to_string();
        let location = match stage {
            Stage::Fetching | Stage::Resolving => artifact.remote_url().to_string(),
            Stage::Extracting | Stage::Assembling => artifact.local_path().display().to_string(),
        };
        let work = task(artifact, cancel.child_token());
        tasks.spawn(async move {
            let result = work.await.map_err(|e| e.in_stage(stage, &id, location));
            (index, result)
        });
    }

    let mut results: Vec<Option<T>> = (0..count).map(|_| None).collect();
    let mut first_error: Option<Error> = None;
    let mut cancelled = false;

    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok((index, Ok(value))) => {
                results[index] = Some(value);
                continue;
            }
            Ok((_, Err(Error::Cancelled))) => {
                cancelled = true;
                continue;
            }
            Ok((_, Err(error))) => error,
            Err(join_error) => Error::Join(join_error),
        };
        if first_error.is_none() {
            log::debug!("{} failed, cancelling remaining tasks", stage);
            cancel.cancel();
            first_error = Some(failure);
        }
    }

    if let Some(error) = first_error {
        return Err(error);
    }
    if cancelled {
        return Err(Error::Cancelled);
    }
    results
        .into_iter()
        .map(|result| result.context("task finished without a result"))
        .collect()
}
