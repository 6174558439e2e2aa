#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Uploads generated packs to S3-compatible storage.

use std::path::PathBuf;

use bird_targets_config::Settings;
use bird_targets_r2::R2Client;
use clap::Parser;

#[derive(Parser)]
#[command(name = "bird_targets_upload", about = "Upload packs to S3-compatible storage")]
struct Cli {
    /// Directory containing packs.json.gz and the version subdirectory
    packs_dir: PathBuf,

    /// Pack version (e.g. `dec-2025`)
    version: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let client = R2Client::from_settings(&settings.s3)?;
    client.upload_packs(&cli.packs_dir, &cli.version).await?;

    log::info!("Upload complete");
    Ok(())
}
