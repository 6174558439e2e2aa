//! Pipeline operations offered by the menu.
//!
//! Every step is idempotent: dataset steps skip when their output exists,
//! and later steps refuse to run until the files they need are present.

use std::path::Path;
use std::time::Instant;

use bird_targets_build::{BuildOptions, build_database};
use bird_targets_cli_utils::{IndicatifProgress, MultiProgress, format_duration};
use bird_targets_cluster::ClusterParams;
use bird_targets_config::{DatasetPaths, OutputPaths, Settings};
use bird_targets_database::scan::ScanSettings;
use bird_targets_database::store;
use bird_targets_dataset::{download, extract, project};
use bird_targets_ebird::EbirdClient;
use bird_targets_models::DatasetKind;
use bird_targets_pack::generate::DEFAULT_REQUEST_DELAY;
use bird_targets_pack::{GenerateOptions, PackContext, generate_all, load_definitions};
use bird_targets_r2::R2Client;

/// Boxed error for step failures.
pub type StepError = Box<dyn std::error::Error>;

/// One menu entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Download(DatasetKind),
    Extract(DatasetKind),
    Filter(DatasetKind),
    BuildDatabase,
    GeneratePacks,
    UploadPacks,
    All,
}

impl Operation {
    pub const ALL: &[Self] = &[
        Self::Download(DatasetKind::Species),
        Self::Extract(DatasetKind::Species),
        Self::Filter(DatasetKind::Species),
        Self::Download(DatasetKind::Sampling),
        Self::Extract(DatasetKind::Sampling),
        Self::Filter(DatasetKind::Sampling),
        Self::BuildDatabase,
        Self::GeneratePacks,
        Self::UploadPacks,
        Self::All,
    ];

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Download(DatasetKind::Species) => "Download Species Dataset",
            Self::Extract(DatasetKind::Species) => "Extract Species Archive",
            Self::Filter(DatasetKind::Species) => "Filter Species Dataset",
            Self::Download(DatasetKind::Sampling) => "Download Sampling Dataset",
            Self::Extract(DatasetKind::Sampling) => "Extract Sampling Archive",
            Self::Filter(DatasetKind::Sampling) => "Filter Sampling Dataset",
            Self::BuildDatabase => "Build Database",
            Self::GeneratePacks => "Generate Packs",
            Self::UploadPacks => "Upload Packs",
            Self::All => "All (Run all steps)",
        }
    }

    /// Steps run by [`Operation::All`], in order. Upload is left out so a
    /// full run never publishes without a separate decision.
    #[must_use]
    pub fn sequence() -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|op| !matches!(op, Self::UploadPacks | Self::All))
            .collect()
    }
}

/// What every step needs.
pub struct StepContext<'a> {
    pub settings: &'a Settings,
    pub output: OutputPaths,
    pub paths: DatasetPaths,
    pub multi: &'a MultiProgress,
}

fn banner(title: &str) {
    log::info!("{}", "-".repeat(50));
    log::info!("Step: {title}");
    log::info!("{}", "-".repeat(50));
}

/// Runs one operation.
///
/// # Errors
///
/// Returns the first failing step's error.
#[allow(clippy::future_not_send)]
pub async fn run(op: Operation, ctx: &StepContext<'_>) -> Result<(), StepError> {
    match op {
        Operation::All => {
            log::info!("Running all steps...");
            for step in Operation::sequence() {
                Box::pin(run(step, ctx))
                    .await
                    .map_err(|e| format!("{} failed: {e}", step.label()))?;
            }
            Ok(())
        }
        op => {
            banner(op.label());
            let start = Instant::now();
            run_one(op, ctx).await?;
            log::info!("{} finished in {}", op.label(), format_duration(start.elapsed()));
            Ok(())
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run_one(op: Operation, ctx: &StepContext<'_>) -> Result<(), StepError> {
    match op {
        Operation::Download(kind) => {
            download::download(ctx.paths.files(kind), &ctx.paths.datasets_dir)?;
        }
        Operation::Extract(kind) => {
            extract::extract(ctx.paths.files(kind))?;
        }
        Operation::Filter(kind) => {
            let bar = IndicatifProgress::rows_bar(ctx.multi, "Filtering");
            project::project(ctx.paths.files(kind), &*bar)?;
        }
        Operation::BuildDatabase => build(ctx).await?,
        Operation::GeneratePacks => generate_packs(ctx).await?,
        Operation::UploadPacks => upload_packs(ctx).await?,
        Operation::All => unreachable!("handled by run"),
    }
    Ok(())
}

fn require(path: &Path, what: &str, step: &str) -> Result<(), StepError> {
    if path.exists() {
        Ok(())
    } else {
        Err(format!("{what} not found: {} (run the {step} step first)", path.display()).into())
    }
}

#[allow(clippy::future_not_send)]
async fn build(ctx: &StepContext<'_>) -> Result<(), StepError> {
    let species = &ctx.paths.files(DatasetKind::Species).filtered;
    let sampling = &ctx.paths.files(DatasetKind::Sampling).filtered;
    require(species, "Filtered species file", "species filter")?;
    require(sampling, "Filtered sampling file", "sampling filter")?;

    let settings = ctx.settings;
    log::info!("Memory limit: {}", settings.memory_limit());
    log::info!("Threads: {}", settings.threads);
    log::info!("Wilson z-index: {}", settings.wilson_z);

    let mut options = BuildOptions::new(species.clone(), sampling.clone(), ctx.paths.db.clone());
    options.scan = ScanSettings {
        temp_dir: Some(ctx.paths.outputs_dir.clone()),
        memory_limit: Some(settings.memory_limit()),
        threads: Some(settings.threads),
    };
    options.wilson_z = settings.wilson_z;
    options.api_key.clone_from(&settings.ebird_api_key);

    let bar = IndicatifProgress::steps_bar(ctx.multi, "Writing statistics", 13);
    build_database(&options, &*bar).await?;
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn generate_packs(ctx: &StepContext<'_>) -> Result<(), StepError> {
    let db = &ctx.paths.db;
    require(db, "Database file", "build database")?;
    let api_key = ctx.settings.require_api_key()?.to_string();

    let output_dir = ctx.output.packs_dir.clone();
    std::fs::create_dir_all(&output_dir)?;
    log::info!("Database: {}", db.display());
    log::info!("Output directory: {}", output_dir.display());

    let definitions = load_definitions(&ctx.settings.packs_file())?;
    let conn = store::open_read_only(db)?;
    let client = EbirdClient::new(Some(api_key))?;
    let context = PackContext::load(&client, &conn).await?;

    let options = GenerateOptions {
        output_dir,
        version: ctx.paths.release.slug(),
        region: None,
        request_delay: DEFAULT_REQUEST_DELAY,
        cluster_params: ClusterParams::default(),
    };
    let summary = generate_all(&client, &conn, &definitions, &context, &options).await?;

    log::info!(
        "{} generated, {} skipped, {} failed",
        summary.generated.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
    if summary.generated.is_empty() {
        return Err("no packs were generated".into());
    }
    Ok(())
}

async fn upload_packs(ctx: &StepContext<'_>) -> Result<(), StepError> {
    let client = R2Client::from_settings(&ctx.settings.s3)?;
    let stats = client
        .upload_packs(&ctx.output.packs_dir, &ctx.paths.release.slug())
        .await?;
    log::info!("Uploaded to {}: {stats}", client.bucket());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operation_has_a_distinct_label() {
        let mut labels: Vec<&str> = Operation::ALL.iter().map(Operation::label).collect();
        let count = labels.len();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), count);
    }

    #[test]
    fn full_run_excludes_upload_and_itself() {
        let sequence = Operation::sequence();
        assert_eq!(sequence.len(), 8);
        assert_eq!(sequence[0], Operation::Download(DatasetKind::Species));
        assert_eq!(sequence[5], Operation::Filter(DatasetKind::Sampling));
        assert_eq!(sequence[6], Operation::BuildDatabase);
        assert_eq!(sequence[7], Operation::GeneratePacks);
    }

    #[test]
    fn missing_prerequisites_name_the_step() {
        let err = require(Path::new("/nonexistent/targets-dec-2025.db"), "Database file", "build database")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Database file not found: /nonexistent/targets-dec-2025.db (run the build database step first)"
        );
    }
}
