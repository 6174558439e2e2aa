#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Preparation of eBird Basic Dataset releases.
//!
//! A release goes through three idempotent steps per dataset kind:
//!
//! 1. [`download`]: fetch the release tar with `aria2c`
//! 2. [`extract`]: pull the gzipped TSV out of the tar
//! 3. [`project`]: keep the needed columns of complete hotspot checklists
//!
//! Each step is skipped when its output already exists. [`events`] reads
//! the projected files back as typed events.

pub mod download;
pub mod events;
pub mod extract;
pub mod project;

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from dataset preparation.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Filesystem error.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// TSV read or write error.
    #[error("TSV error in {}: {source}", .path.display())]
    Csv {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: csv::Error,
    },

    /// Required columns are absent from the header.
    #[error("{} is missing required columns: {}", .path.display(), .columns.join(", "))]
    MissingColumns {
        /// Input path.
        path: PathBuf,
        /// Missing column names.
        columns: Vec<String>,
    },

    /// A prerequisite file from an earlier step is absent.
    #[error("{what} not found: {} (run the {step} step first)", .path.display())]
    MissingInput {
        /// Description of the file.
        what: &'static str,
        /// Expected path.
        path: PathBuf,
        /// Step that produces it.
        step: &'static str,
    },

    /// The archive does not contain the expected member.
    #[error("{member} not found in {}", .archive.display())]
    MemberNotFound {
        /// Archive path.
        archive: PathBuf,
        /// Member name.
        member: String,
    },

    /// An external command could not be run or exited unsuccessfully.
    #[error("{program} failed: {message}")]
    Command {
        /// Program name.
        program: &'static str,
        /// Exit status or spawn error.
        message: String,
    },
}

impl DatasetError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Whether a step did work or found its output already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The output was produced.
    Done,
    /// The output already existed.
    Skipped,
}

/// Returns [`StepOutcome::Skipped`] and logs when `output` exists.
pub(crate) fn skip_if_exists(output: &Path, what: &str) -> Option<StepOutcome> {
    if output.exists() {
        log::info!("{what} already exists: {}", output.display());
        log::info!("Skipping. Delete the file to redo this step.");
        Some(StepOutcome::Skipped)
    } else {
        None
    }
}

/// Path of the in-progress file written before the final rename
/// (`targets-dec-2025.db` becomes `targets-dec-2025.db.partial`).
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/d/ebd-dec-2025-filtered.tsv")),
            PathBuf::from("/d/ebd-dec-2025-filtered.tsv.partial")
        );
    }

    #[test]
    fn existing_output_is_skipped() {
        let dir = std::env::temp_dir().join(format!("bird_targets_skip_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("present.tsv");
        std::fs::write(&file, "x").unwrap();

        assert_eq!(skip_if_exists(&file, "Output"), Some(StepOutcome::Skipped));
        assert_eq!(skip_if_exists(&dir.join("absent.tsv"), "Output"), None);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
