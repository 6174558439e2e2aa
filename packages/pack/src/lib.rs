#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Per-region target packs.
//!
//! A pack bundles the hotspots of one region with per-location monthly
//! species arrays, written as gzipped compact JSON to
//! `{packs_dir}/{version}/{region}.json.gz`. `packs.json.gz` indexes the
//! packs with their cluster centers so clients can pick one from a map.

pub mod assemble;
pub mod generate;
pub mod obs_map;

use std::path::{Path, PathBuf};

use bird_targets_database::DbError;
use bird_targets_ebird::EbirdError;
use thiserror::Error;

pub use assemble::{
    RegionNames, assemble_pack, build_pack_hotspots, build_pack_targets, load_definitions,
    write_index, write_pack,
};
pub use generate::{GenerateOptions, GenerateSummary, PackContext, generate_all, generate_pack};
pub use obs_map::MonthObsMap;

/// Errors from pack generation.
#[derive(Debug, Error)]
pub enum PackError {
    /// Filesystem error.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database query failed.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Hotspot fetch failed.
    #[error(transparent)]
    Ebird(#[from] EbirdError),

    /// Pack definitions file is unreadable or malformed.
    #[error("Invalid pack definitions {}: {message}", .path.display())]
    Definitions {
        /// Definitions file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// `--region` names a region with no definition.
    #[error("Pack for region '{region}' not found. Available regions: {}", .available.join(", "))]
    UnknownRegion {
        /// Requested region.
        region: String,
        /// Defined regions.
        available: Vec<String>,
    },
}

impl PackError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
