#![allow(clippy::module_name_repetitions)]
//! Canonical directories for datasets and build outputs.
//!
//! Everything hangs off one base directory (the project root, or
//! `OUTPUT_PATH` resolved against it):
//!
//! ```text
//! {base}/datasets/        downloaded tars, extracted and projected TSVs
//! {base}/output/          targets-{mon}-{year}.db
//! {base}/output/packs/    packs.json.gz and {version}/{region}.json.gz
//! ```

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`; falls back to the
/// current directory when the manifest is not nested two levels deep.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Dataset, output, and pack directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Raw and projected dataset files.
    pub datasets_dir: PathBuf,
    /// Built databases.
    pub outputs_dir: PathBuf,
    /// Generated packs.
    pub packs_dir: PathBuf,
}

impl OutputPaths {
    /// Lays out the directories under `base`.
    #[must_use]
    pub fn from_base(base: &Path) -> Self {
        let outputs_dir = base.join("output");
        Self {
            datasets_dir: base.join("datasets"),
            packs_dir: outputs_dir.join("packs"),
            outputs_dir,
        }
    }
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_under_base() {
        let paths = OutputPaths::from_base(Path::new("/data/birds"));
        assert_eq!(paths.datasets_dir, PathBuf::from("/data/birds/datasets"));
        assert_eq!(paths.outputs_dir, PathBuf::from("/data/birds/output"));
        assert_eq!(paths.packs_dir, PathBuf::from("/data/birds/output/packs"));
    }

    #[test]
    fn project_root_contains_workspace_manifest() {
        assert!(project_root().join("Cargo.toml").exists());
    }
}
