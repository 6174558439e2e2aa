//! eBird Basic Dataset release naming.
//!
//! eBird publishes the EBD monthly as `ebd_rel{Mon}-{year}.tar`, with the
//! checklist-level sampling file alongside as
//! `ebd_sampling_rel{Mon}-{year}.tar`. Local copies are renamed to
//! lowercase slugs so one release's files sort together.

use std::path::{Path, PathBuf};

use bird_targets_models::DatasetKind;
use chrono::{Datelike as _, Months, NaiveDate};

use crate::paths::OutputPaths;

/// Base URL for prepackaged release downloads.
pub const DOWNLOAD_BASE_URL: &str = "https://download.ebird.org/ebd/prepackaged";

/// Prefix of built database file stems.
pub const DB_PREFIX: &str = "targets-";

/// A monthly dataset release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Release {
    first_day: NaiveDate,
}

impl Release {
    /// Creates a release for `year`/`month`; `None` for an invalid month.
    #[must_use]
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first_day| Self { first_day })
    }

    /// The month containing `today` followed by the `count - 1` months
    /// before it, newest first.
    #[must_use]
    pub fn recent(today: NaiveDate, count: usize) -> Vec<Self> {
        let Some(current) = Self::new(today.year(), today.month()) else {
            return Vec::new();
        };
        (0..count)
            .filter_map(|i| {
                let back = u32::try_from(i).ok()?;
                current
                    .first_day
                    .checked_sub_months(Months::new(back))
                    .map(|first_day| Self { first_day })
            })
            .collect()
    }

    /// Three-letter month name (`Dec`).
    #[must_use]
    pub fn month_abbrev(&self) -> String {
        self.first_day.format("%b").to_string()
    }

    /// Calendar year.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    /// Lowercase `{mon}-{year}` slug (`dec-2025`), also used as the pack
    /// version.
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}-{}", self.month_abbrev().to_lowercase(), self.year())
    }
}

impl std::fmt::Display for Release {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.month_abbrev(), self.year())
    }
}

/// Files for one dataset kind of one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetFiles {
    /// Which dataset.
    pub kind: DatasetKind,
    /// Downloaded archive.
    pub tar: PathBuf,
    /// Gzipped TSV extracted from the archive.
    pub txt_gz: PathBuf,
    /// Projected, filtered TSV.
    pub filtered: PathBuf,
    /// Upstream release name (`ebd_relDec-2025`).
    pub release_name: String,
    /// Download URL.
    pub download_url: String,
}

impl DatasetFiles {
    fn new(kind: DatasetKind, release: Release, datasets_dir: &Path) -> Self {
        let (local_prefix, upstream_prefix) = match kind {
            DatasetKind::Species => ("ebd", "ebd_rel"),
            DatasetKind::Sampling => ("ebd-sampling", "ebd_sampling_rel"),
        };
        let base = format!("{local_prefix}-{}", release.slug());
        let release_name = format!(
            "{upstream_prefix}{}-{}",
            release.month_abbrev(),
            release.year()
        );

        Self {
            kind,
            tar: datasets_dir.join(format!("{base}.tar")),
            txt_gz: datasets_dir.join(format!("{base}.txt.gz")),
            filtered: datasets_dir.join(format!("{base}-filtered.tsv")),
            download_url: format!("{DOWNLOAD_BASE_URL}/{release_name}.tar"),
            release_name,
        }
    }

    /// Name of the gzipped TSV inside the archive.
    #[must_use]
    pub fn archive_member(&self) -> String {
        format!("{}.txt.gz", self.release_name)
    }
}

/// Every path used to process one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    /// The release.
    pub release: Release,
    /// Species observations.
    pub species: DatasetFiles,
    /// Sampling events.
    pub sampling: DatasetFiles,
    /// Built database.
    pub db: PathBuf,
    /// Directory holding dataset files.
    pub datasets_dir: PathBuf,
    /// Directory holding built databases.
    pub outputs_dir: PathBuf,
}

impl DatasetPaths {
    /// Derives all paths for `release`.
    #[must_use]
    pub fn for_release(release: Release, output: &OutputPaths) -> Self {
        Self {
            release,
            species: DatasetFiles::new(DatasetKind::Species, release, &output.datasets_dir),
            sampling: DatasetFiles::new(DatasetKind::Sampling, release, &output.datasets_dir),
            db: output
                .outputs_dir
                .join(format!("{DB_PREFIX}{}.db", release.slug())),
            datasets_dir: output.datasets_dir.clone(),
            outputs_dir: output.outputs_dir.clone(),
        }
    }

    /// Files for one dataset kind.
    #[must_use]
    pub const fn files(&self, kind: DatasetKind) -> &DatasetFiles {
        match kind {
            DatasetKind::Species => &self.species,
            DatasetKind::Sampling => &self.sampling,
        }
    }
}

/// Derives the pack version from a database path
/// (`targets-dec-2025.db` becomes `dec-2025`).
#[must_use]
pub fn pack_version_from_db(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.strip_prefix(DB_PREFIX)
        .map_or_else(|| stem.clone(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(year: i32, month: u32) -> Release {
        Release::new(year, month).unwrap()
    }

    #[test]
    fn release_names() {
        let dec = release(2025, 12);
        assert_eq!(dec.month_abbrev(), "Dec");
        assert_eq!(dec.slug(), "dec-2025");
        assert_eq!(dec.to_string(), "Dec 2025");
        assert!(Release::new(2025, 13).is_none());
    }

    #[test]
    fn recent_releases_cross_year_boundary() {
        let today = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        let labels: Vec<_> = Release::recent(today, 3)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(labels, vec!["Feb 2026", "Jan 2026", "Dec 2025"]);
    }

    #[test]
    fn dataset_paths_for_release() {
        let output = OutputPaths::from_base(Path::new("/base"));
        let paths = DatasetPaths::for_release(release(2025, 12), &output);

        assert_eq!(paths.species.tar, PathBuf::from("/base/datasets/ebd-dec-2025.tar"));
        assert_eq!(
            paths.species.filtered,
            PathBuf::from("/base/datasets/ebd-dec-2025-filtered.tsv")
        );
        assert_eq!(paths.species.release_name, "ebd_relDec-2025");
        assert_eq!(paths.species.archive_member(), "ebd_relDec-2025.txt.gz");
        assert_eq!(
            paths.species.download_url,
            "https://download.ebird.org/ebd/prepackaged/ebd_relDec-2025.tar"
        );

        assert_eq!(
            paths.sampling.txt_gz,
            PathBuf::from("/base/datasets/ebd-sampling-dec-2025.txt.gz")
        );
        assert_eq!(paths.sampling.release_name, "ebd_sampling_relDec-2025");
        assert_eq!(
            paths.files(DatasetKind::Sampling).download_url,
            "https://download.ebird.org/ebd/prepackaged/ebd_sampling_relDec-2025.tar"
        );

        assert_eq!(paths.db, PathBuf::from("/base/output/targets-dec-2025.db"));
    }

    #[test]
    fn pack_version_from_db_stem() {
        assert_eq!(pack_version_from_db(Path::new("out/targets-dec-2025.db")), "dec-2025");
        assert_eq!(pack_version_from_db(Path::new("custom.db")), "custom");
    }
}
