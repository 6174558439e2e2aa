//! Bulk grouping of projected TSV files with `DuckDB`.
//!
//! The species and sampling files run to hundreds of gigabytes, so the
//! distinct-survey counting happens inside `DuckDB`'s out-of-core
//! aggregation rather than in process memory. Only the grouped counts
//! come back across the boundary.

use std::path::{Path, PathBuf};

use bird_targets_models::{GeoPoint, columns};
use bird_targets_region::LocationRegions;
use bird_targets_stats::GroupedCounts;
use duckdb::Connection;

use crate::{sql_path, sql_string};

/// Errors from scanning input files.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Input file could not be opened.
    #[error("Failed to open {}: {source}", .path.display())]
    Io {
        /// Input path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Header row could not be read.
    #[error("Failed to read header of {}: {source}", .path.display())]
    Header {
        /// Input path.
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

    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// A grouped value is out of range.
    #[error("Unexpected {what} value {value}")]
    OutOfRange {
        /// Which value.
        what: &'static str,
        /// Raw value.
        value: i64,
    },
}

/// Resource limits for the scan engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSettings {
    /// Spill directory for out-of-core operators.
    pub temp_dir: Option<PathBuf>,
    /// Memory limit (e.g. `24GB`).
    pub memory_limit: Option<String>,
    /// Worker threads.
    pub threads: Option<usize>,
}

/// Verifies that a tab-separated file has every `required` column.
///
/// # Errors
///
/// Returns [`ScanError::MissingColumns`] listing the absent columns, or an
/// I/O or header error if the file cannot be read.
pub fn check_columns(path: &Path, required: &[&str]) -> Result<(), ScanError> {
    let file = std::fs::File::open(path).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .from_reader(file);
    let header = reader.headers().map_err(|source| ScanError::Header {
        path: path.to_path_buf(),
        source,
    })?;
    let header: Vec<&str> = header.iter().collect();

    let missing = columns::missing_columns(&header, required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ScanError::MissingColumns {
            path: path.to_path_buf(),
            columns: missing.into_iter().map(str::to_string).collect(),
        })
    }
}

/// `read_csv` table function over a projected TSV file.
///
/// Quoting is disabled (eBird free text contains stray `"`), malformed rows
/// are skipped, and every column is read as text.
fn tsv_source(path: &Path) -> String {
    format!(
        "read_csv({}, delim='\t', header=true, quote='', ignore_errors=true, all_varchar=true)",
        sql_path(path)
    )
}

fn quoted(column: &str) -> String {
    format!("\"{column}\"")
}

/// Effective checklist ID: group identifier when present, else the
/// sampling event identifier.
fn effective_checklist_sql() -> String {
    format!(
        "COALESCE(NULLIF(TRIM({}), ''), {})",
        quoted(columns::GROUP_IDENTIFIER),
        quoted(columns::SAMPLING_EVENT_IDENTIFIER),
    )
}

fn month_sql() -> String {
    format!(
        "EXTRACT(MONTH FROM TRY_CAST({} AS DATE))",
        quoted(columns::OBSERVATION_DATE)
    )
}

fn to_u64(what: &'static str, value: i64) -> Result<u64, ScanError> {
    u64::try_from(value).map_err(|_| ScanError::OutOfRange { what, value })
}

fn to_month(value: i64) -> Result<u8, ScanError> {
    u8::try_from(value)
        .ok()
        .filter(|m| (1..=12).contains(m))
        .ok_or(ScanError::OutOfRange {
            what: "month",
            value,
        })
}

/// In-memory `DuckDB` instance used for grouping.
pub struct Scanner {
    conn: Connection,
}

impl Scanner {
    /// Opens an in-memory engine with the given limits.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::DuckDb`] if the engine cannot be configured.
    pub fn open(settings: &ScanSettings) -> Result<Self, ScanError> {
        let conn = Connection::open_in_memory()?;

        if let Some(dir) = &settings.temp_dir {
            conn.execute_batch(&format!("SET temp_directory = {};", sql_path(dir)))?;
        }
        if let Some(limit) = &settings.memory_limit {
            conn.execute_batch(&format!("SET memory_limit = {};", sql_string(limit)))?;
        }
        if let Some(threads) = settings.threads {
            conn.execute_batch(&format!("SET threads = {threads};"))?;
        }

        Ok(Self { conn })
    }

    /// Groups the sampling file into samples per `(location, month)`.
    ///
    /// Returns the number of groups added to `counts`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if required columns are missing or the query
    /// fails.
    pub fn samples(&self, path: &Path, counts: &mut GroupedCounts) -> Result<usize, ScanError> {
        check_columns(path, columns::CHECKLIST_REQUIRED)?;

        let sql = format!(
            "SELECT {loc}, {month} AS month, COUNT(DISTINCT {eff}) AS samples
             FROM {src}
             WHERE {loc} IS NOT NULL AND {month} IS NOT NULL
             GROUP BY 1, 2",
            loc = quoted(columns::LOCALITY_ID),
            month = month_sql(),
            eff = effective_checklist_sql(),
            src = tsv_source(path),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut groups = 0;
        while let Some(row) = rows.next()? {
            let location_id: String = row.get(0)?;
            let month = to_month(row.get(1)?)?;
            let samples = to_u64("samples", row.get(2)?)?;
            counts.set_samples(&location_id, month, samples);
            groups += 1;
        }

        log::debug!("Grouped {groups} (location, month) sample buckets");
        Ok(groups)
    }

    /// Groups the species file into observations per
    /// `(location, month, scientific name)`.
    ///
    /// Returns the number of groups added to `counts`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if required columns are missing or the query
    /// fails.
    pub fn observations(
        &self,
        path: &Path,
        counts: &mut GroupedCounts,
    ) -> Result<usize, ScanError> {
        check_columns(path, columns::DETECTION_REQUIRED)?;

        let sql = format!(
            "SELECT {loc}, {month} AS month, {sci}, COUNT(DISTINCT {eff}) AS obs
             FROM {src}
             WHERE {loc} IS NOT NULL AND {sci} IS NOT NULL AND {month} IS NOT NULL
             GROUP BY 1, 2, 3",
            loc = quoted(columns::LOCALITY_ID),
            month = month_sql(),
            sci = quoted(columns::SCIENTIFIC_NAME),
            eff = effective_checklist_sql(),
            src = tsv_source(path),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut groups = 0;
        while let Some(row) = rows.next()? {
            let location_id: String = row.get(0)?;
            let month = to_month(row.get(1)?)?;
            let species: String = row.get(2)?;
            let obs = to_u64("obs", row.get(3)?)?;
            counts.set_observations(&location_id, month, &species, obs);
            groups += 1;
        }

        log::debug!("Grouped {groups} (location, month, species) observation buckets");
        Ok(groups)
    }

    /// Collects each location's widest country/state/county codes and its
    /// coordinate from the sampling file.
    ///
    /// Returns the number of locations folded into `regions`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if required columns are missing or the query
    /// fails.
    pub fn locations(
        &self,
        path: &Path,
        regions: &mut LocationRegions,
    ) -> Result<usize, ScanError> {
        check_columns(path, columns::CHECKLIST_REQUIRED)?;

        let text = |col: &str| format!("MAX(NULLIF(TRIM({}), ''))", quoted(col));
        let number = |col: &str| format!("MAX(TRY_CAST({} AS DOUBLE))", quoted(col));
        let sql = format!(
            "SELECT {loc}, {country}, {state}, {county}, {lat}, {lng}
             FROM {src}
             WHERE {loc} IS NOT NULL
             GROUP BY 1",
            loc = quoted(columns::LOCALITY_ID),
            country = text(columns::COUNTRY_CODE),
            state = text(columns::STATE_CODE),
            county = text(columns::COUNTY_CODE),
            lat = number(columns::LATITUDE),
            lng = number(columns::LONGITUDE),
            src = tsv_source(path),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut locations = 0;
        while let Some(row) = rows.next()? {
            let location_id: String = row.get(0)?;
            let country: Option<String> = row.get(1)?;
            let state: Option<String> = row.get(2)?;
            let county: Option<String> = row.get(3)?;
            let lat: Option<f64> = row.get(4)?;
            let lng: Option<f64> = row.get(5)?;

            let point = lat.zip(lng).map(|(lat, lng)| GeoPoint::new(lat, lng));
            regions.observe_fields(
                &location_id,
                country.as_deref(),
                state.as_deref(),
                county.as_deref(),
                point,
            );
            locations += 1;
        }

        log::debug!("Collected region codes for {locations} locations");
        Ok(locations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLING_HEADER: &str = "LOCALITY ID\tLOCALITY\tOBSERVATION DATE\tSAMPLING EVENT IDENTIFIER\tGROUP IDENTIFIER\tCOUNTRY CODE\tSTATE CODE\tCOUNTY CODE\tLATITUDE\tLONGITUDE";
    const SPECIES_HEADER: &str = "LOCALITY ID\tLOCALITY\tLOCALITY TYPE\tLATITUDE\tLONGITUDE\tOBSERVATION DATE\tSAMPLING EVENT IDENTIFIER\tALL SPECIES REPORTED\tGROUP IDENTIFIER\tCATEGORY\tSCIENTIFIC NAME";

    fn write_tsv(name: &str, header: &str, rows: &[&str]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bird_targets_scan_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut contents = format!("{header}\n");
        for row in rows {
            contents.push_str(row);
            contents.push('\n');
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_columns_are_reported() {
        let path = write_tsv("short.tsv", "LOCALITY ID\tOBSERVATION DATE", &["L1\t2024-01-01"]);
        let err = check_columns(&path, columns::CHECKLIST_REQUIRED).unwrap_err();
        match err {
            ScanError::MissingColumns { columns, .. } => {
                assert!(columns.contains(&"SAMPLING EVENT IDENTIFIER".to_string()));
                assert!(!columns.contains(&"LOCALITY ID".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn samples_deduplicate_group_checklists() {
        let path = write_tsv(
            "sampling.tsv",
            SAMPLING_HEADER,
            &[
                "L1\tPark\t2024-05-01\tS1\tG1\tUS\tUS-CA\tUS-CA-085\t37.1\t-122.1",
                "L1\tPark\t2024-05-01\tS2\tG1\tUS\tUS-CA\tUS-CA-085\t37.1\t-122.1",
                "L1\tPark\t2024-05-09\tS3\t\tUS\tUS-CA\tUS-CA-085\t37.1\t-122.1",
                "L1\tPark\t2024-06-09\tS4\t\tUS\tUS-CA\tUS-CA-085\t37.1\t-122.1",
                "L2\tLake\tnot-a-date\tS5\t\tCO\tCO-\t\t4.6\t-74.1",
            ],
        );

        let scanner = Scanner::open(&ScanSettings::default()).unwrap();
        let mut counts = GroupedCounts::default();
        let groups = scanner.samples(&path, &mut counts).unwrap();

        assert_eq!(groups, 2);
        assert_eq!(counts.samples["L1"][&5], 2);
        assert_eq!(counts.samples["L1"][&6], 1);
        assert!(!counts.samples.contains_key("L2"));
    }

    #[test]
    fn observations_group_by_species() {
        let path = write_tsv(
            "species.tsv",
            SPECIES_HEADER,
            &[
                "L1\tPark\tH\t37.1\t-122.1\t2024-05-01\tS1\t1\tG1\tspecies\tTurdus migratorius",
                "L1\tPark\tH\t37.1\t-122.1\t2024-05-01\tS2\t1\tG1\tspecies\tTurdus migratorius",
                "L1\tPark\tH\t37.1\t-122.1\t2024-05-09\tS3\t1\t\tspecies\tTurdus migratorius",
                "L1\tPark\tH\t37.1\t-122.1\t2024-05-09\tS3\t1\t\tspecies\tCorvus corax",
            ],
        );

        let scanner = Scanner::open(&ScanSettings::default()).unwrap();
        let mut counts = GroupedCounts::default();
        scanner.observations(&path, &mut counts).unwrap();

        let robin = ("L1".to_string(), 5, "Turdus migratorius".to_string());
        let raven = ("L1".to_string(), 5, "Corvus corax".to_string());
        assert_eq!(counts.observations[&robin], 2);
        assert_eq!(counts.observations[&raven], 1);
    }

    #[test]
    fn locations_take_widest_codes() {
        let path = write_tsv(
            "locations.tsv",
            SAMPLING_HEADER,
            &[
                "L1\tPark\t2024-05-01\tS1\t\tUS\t\t\t37.1\t-122.1",
                "L1\tPark\t2024-05-02\tS2\t\tUS\tUS-CA\tUS-CA-085\t37.1\t-122.1",
                "L2\tLake\t2024-05-02\tS3\t\tCO\tCO-\t\t4.6\t-74.1",
            ],
        );

        let scanner = Scanner::open(&ScanSettings::default()).unwrap();
        let mut regions = LocationRegions::new();
        assert_eq!(scanner.locations(&path, &mut regions).unwrap(), 2);

        let resolved = regions.resolve();
        assert_eq!(resolved["L1"].region.region_code, "US-CA-085");
        assert_eq!(resolved["L2"].region.region_code, "CO");
        assert_eq!(resolved["L2"].point, Some(GeoPoint::new(4.6, -74.1)));
    }
}
