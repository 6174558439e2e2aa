//! Release download with `aria2c`.
//!
//! Release tars run to hundreds of gigabytes and eBird's download server
//! drops long connections, so the download is delegated to `aria2c` with
//! resume enabled and unlimited retries.

use std::path::Path;
use std::process::Command;

use bird_targets_config::DatasetFiles;

use crate::{DatasetError, StepOutcome, skip_if_exists};

/// Command-line arguments for fetching `files` into `datasets_dir`.
#[must_use]
pub fn aria2c_args(files: &DatasetFiles, datasets_dir: &Path) -> Vec<String> {
    let output_name = files
        .tar
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    vec![
        "-d".to_string(),
        datasets_dir.to_string_lossy().into_owned(),
        "-o".to_string(),
        output_name,
        "-c".to_string(),
        "-x".to_string(),
        "2".to_string(),
        "-s".to_string(),
        "2".to_string(),
        "-j".to_string(),
        "1".to_string(),
        "--retry-wait=30".to_string(),
        "--max-tries=0".to_string(),
        files.download_url.clone(),
    ]
}

/// Downloads the release tar unless it already exists.
///
/// A failed download removes the partial tar.
///
/// # Errors
///
/// Returns [`DatasetError::Command`] if `aria2c` is not installed or exits
/// unsuccessfully (typically because the release is not published yet).
pub fn download(files: &DatasetFiles, datasets_dir: &Path) -> Result<StepOutcome, DatasetError> {
    if let Some(skipped) = skip_if_exists(&files.tar, "Dataset") {
        return Ok(skipped);
    }

    std::fs::create_dir_all(datasets_dir).map_err(|e| DatasetError::io(datasets_dir, e))?;

    log::info!("Downloading: {}", files.download_url);
    log::info!("To: {}", files.tar.display());

    let status = Command::new("aria2c")
        .args(aria2c_args(files, datasets_dir))
        .status()
        .map_err(|e| DatasetError::Command {
            program: "aria2c",
            message: format!("could not start ({e}); is aria2 installed?"),
        })?;

    if !status.success() {
        if files.tar.exists()
            && let Err(e) = std::fs::remove_file(&files.tar)
        {
            log::warn!("Failed to remove partial download {}: {e}", files.tar.display());
        }
        return Err(DatasetError::Command {
            program: "aria2c",
            message: format!(
                "{status}; the dataset may not be available yet (eBird releases around mid-month)"
            ),
        });
    }

    log::info!("Download complete");
    Ok(StepOutcome::Done)
}
