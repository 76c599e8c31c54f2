//! Command line interface for the SDK generator.
//!
//! Parses arguments, builds validated settings, runs the [`Generator`] and
//! reports the outcome.

mod args;
mod output;

pub use args::{Args, RuntimeConfig};
pub use output::OutputManager;

use crate::{
    bundler::Generator,
    error::{CliError, GeneratorError, Result},
};

/// Main CLI entry point
pub async fn run(args: Args) -> Result<i32> {
    let config = RuntimeConfig::from(&args);

    if let Err(reason) = args.validate() {
        report(&config, &CliError::InvalidArguments { reason }.into())?;
        return Ok(2);
    }

    match generate(&args, &config).await {
        Ok(()) => Ok(0),
        Err(error) => {
            report(&config, &error)?;
            Ok(1)
        }
    }
}

fn report(config: &RuntimeConfig, error: &GeneratorError) -> Result<()> {
    config.error(&error.to_string())?;
    for suggestion in error.recovery_suggestions() {
        config.indent(&suggestion)?;
    }
    if error.is_recoverable() {
        config.warn("This failure may be temporary; rerunning resumes from the download cache")?;
    }
    Ok(())
}

async fn generate(args: &Args, config: &RuntimeConfig) -> Result<()> {
    let settings = args.to_settings()?;

    config.section("Swift SDK generator")?;
    config.indent(&format!("Swift:   {}", settings.swift_version()))?;
    config.indent(&format!("Build:   {}", settings.build_triple()))?;
    config.indent(&format!("Target:  {}", settings.target_triple()))?;
    config.indent(&format!("Root:    {}", settings.source_root().display()))?;
    config.verbose_println(&format!(
        "Extraction: {}",
        if settings.use_docker() {
            settings.docker_image()
        } else {
            "local"
        }
    ))?;

    config.progress(&format!("Generating {}", settings.artifact_id()))?;
    let report = Generator::new(settings)?.generate().await?;

    if report.up_to_date {
        config.success(&format!("{} is up to date", report.artifact_id))?;
    } else {
        config.success(&format!(
            "Generated {} ({} downloads)",
            report.artifact_id, report.transferred
        ))?;
    }
    config.indent(&format!("Bundle:   {}", report.bundle_path.display()))?;
    config.indent(&format!("Manifest: {}", report.manifest_path.display()))?;
    Ok(())
}
