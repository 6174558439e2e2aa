#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Interactive entry point for the bird targets pipeline.
//!
//! Asks which eBird release to work on and which step to run, then runs
//! it. Log output goes through [`bird_targets_cli_utils::init_logger`] so
//! progress bars and log lines share the terminal.

mod notify;
mod steps;

use bird_targets_config::paths::ensure_dir;
use bird_targets_config::{DatasetPaths, Release, Settings};
use dialoguer::Select;

use crate::notify::Notice;
use crate::steps::{Operation, StepContext};

const RELEASE_CHOICES: usize = 3;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = bird_targets_cli_utils::init_logger();

    println!("eBird Targets Aggregator");
    println!();

    let settings = Settings::load()?;

    let releases = Release::recent(chrono::Local::now().date_naive(), RELEASE_CHOICES);
    let release_labels: Vec<String> = releases.iter().map(ToString::to_string).collect();
    let release_idx = Select::new()
        .with_prompt("Which dataset do you want to use? Some may not be available yet.")
        .items(&release_labels)
        .default(0)
        .interact()?;
    let release = releases[release_idx];

    let labels: Vec<&str> = Operation::ALL.iter().map(Operation::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;
    let operation = Operation::ALL[idx];

    let output = settings.output_paths();
    ensure_dir(&output.datasets_dir)?;
    ensure_dir(&output.outputs_dir)?;
    let ctx = StepContext {
        settings: &settings,
        paths: DatasetPaths::for_release(release, &output),
        output,
        multi: &multi,
    };

    let result = steps::run(operation, &ctx).await;
    let success = match &result {
        Ok(()) => {
            println!("Complete!");
            true
        }
        Err(e) => {
            log::error!("Aborting: {e}");
            println!("Failed!");
            false
        }
    };

    if let Some(topic) = settings.ntfy_topic.as_deref() {
        let notice = Notice::for_run(operation.label(), &release.to_string(), success);
        notify::send(topic, &notice).await;
    }

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
