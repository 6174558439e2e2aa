#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Generates region packs from a built targets database.

use std::path::PathBuf;
use std::time::Instant;

use bird_targets_cluster::ClusterParams;
use bird_targets_config::{Settings, pack_version_from_db};
use bird_targets_database::store;
use bird_targets_ebird::EbirdClient;
use bird_targets_pack::generate::DEFAULT_REQUEST_DELAY;
use bird_targets_pack::{GenerateOptions, PackContext, generate_all, load_definitions};
use clap::Parser;

#[derive(Parser)]
#[command(name = "bird_targets_pack", about = "Generate compressed JSON packs for each region")]
struct Cli {
    /// Path to the targets database
    db_path: PathBuf,

    /// Generate the pack for a single region only
    #[arg(long)]
    region: Option<String>,

    /// Output directory for pack files
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let api_key = settings.require_api_key()?.to_string();
    let output_dir = cli
        .output_dir
        .unwrap_or_else(|| settings.output_paths().packs_dir);
    std::fs::create_dir_all(&output_dir)?;

    let version = pack_version_from_db(&cli.db_path);
    log::info!("Database: {}", cli.db_path.display());
    log::info!("Output directory: {}", output_dir.display());
    log::info!("Pack version: {version}");

    let definitions = load_definitions(&settings.packs_file())?;
    log::info!("Loaded {} pack definitions", definitions.len());

    let conn = store::open_read_only(&cli.db_path)?;
    let client = EbirdClient::new(Some(api_key))?;
    let context = PackContext::load(&client, &conn).await?;

    let start = Instant::now();
    let options = GenerateOptions {
        output_dir,
        version,
        region: cli.region,
        request_delay: DEFAULT_REQUEST_DELAY,
        cluster_params: ClusterParams::default(),
    };
    let summary = generate_all(&client, &conn, &definitions, &context, &options).await?;

    log::info!(
        "Completed in {:.1}s: {} generated, {} skipped, {} failed",
        start.elapsed().as_secs_f64(),
        summary.generated.len(),
        summary.skipped.len(),
        summary.failed.len()
    );

    if summary.generated.is_empty() && !summary.failed.is_empty() {
        return Err("no packs were generated".into());
    }

    Ok(())
}
