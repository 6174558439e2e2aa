#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `DuckDB` storage for bird targets.
//!
//! Two roles share one engine:
//!
//! * [`scan`] streams the projected TSV files through an in-memory `DuckDB`
//!   instance and groups them into distinct-survey counts.
//! * [`store`] owns the output database (`targets-{mon}-{year}.db`) with
//!   the `species`, `month_obs`, `year_obs`, `locations`, and `hotspots`
//!   tables.

pub mod scan;
pub mod store;

use std::path::Path;

pub use scan::ScanError;

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Quotes a filesystem path as a SQL string literal.
pub(crate) fn sql_path(path: &Path) -> String {
    sql_string(&path.to_string_lossy())
}

/// Quotes a value as a SQL string literal.
pub(crate) fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Converts a `DuckDB` count to `u64`.
pub(crate) fn count_from_i64(value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_| DbError::Conversion {
        message: format!("negative count {value}"),
    })
}
