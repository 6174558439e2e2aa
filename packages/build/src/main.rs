#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Builds the targets database from projected species and sampling files.

use std::path::PathBuf;

use bird_targets_build::{BuildOptions, Engine, build_database};
use bird_targets_config::Settings;
use bird_targets_database::scan::ScanSettings;
use bird_targets_models::progress::NullProgress;
use clap::Parser;

#[derive(Parser)]
#[command(
    name = "bird_targets_build",
    about = "Aggregate eBird surveys into per-location target statistics"
)]
struct Cli {
    /// Projected species file (TSV)
    species_file: PathBuf,

    /// Projected sampling file (TSV)
    sampling_file: PathBuf,

    /// Output database path
    output_db: PathBuf,

    /// Spill directory for out-of-core grouping
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Memory limit for the scan engine (e.g. `24GB`)
    #[arg(long)]
    memory_limit: Option<String>,

    /// Worker threads for the scan engine
    #[arg(long)]
    threads: Option<usize>,

    /// Do not download hotspot reference data
    #[arg(long)]
    skip_hotspots: bool,

    /// Wilson score z (defaults to `WILSON_SCORE_Z_INDEX` or 1.96)
    #[arg(long)]
    wilson_z: Option<f64>,

    /// Counting engine: `duckdb` or `memory`
    #[arg(long, default_value = "duckdb")]
    engine: Engine,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    log::info!("Species file: {}", cli.species_file.display());
    log::info!("Sampling file: {}", cli.sampling_file.display());
    log::info!("Output: {}", cli.output_db.display());

    let mut options = BuildOptions::new(cli.species_file, cli.sampling_file, cli.output_db);
    options.scan = ScanSettings {
        temp_dir: cli.temp_dir,
        memory_limit: Some(cli.memory_limit.unwrap_or_else(|| settings.memory_limit())),
        threads: Some(cli.threads.unwrap_or(settings.threads)),
    };
    options.engine = cli.engine;
    options.wilson_z = cli.wilson_z.unwrap_or(settings.wilson_z);
    options.api_key = settings.ebird_api_key.clone();
    options.skip_hotspots = cli.skip_hotspots;

    build_database(&options, &NullProgress).await?;

    Ok(())
}
