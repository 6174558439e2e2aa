//! Column projection of the gzipped release files.
//!
//! The raw release TSVs have around 50 columns; aggregation needs a
//! handful. Projection streams the gzip once, keeps the needed columns of
//! complete checklists at hotspots, and writes a plain TSV that the scan
//! engine can read many times over.

use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;

use bird_targets_config::DatasetFiles;
use bird_targets_models::progress::ProgressCallback;
use bird_targets_models::{DatasetKind, columns};
use flate2::read::MultiGzDecoder;

use crate::{DatasetError, StepOutcome, partial_path, skip_if_exists};

/// Rows between progress log lines.
const LOG_EVERY: u64 = 1_000_000;

/// Which columns to keep and which rows to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    /// Output columns, in output order.
    pub columns: &'static [&'static str],
    /// `(column, value)` pairs every kept row must match exactly.
    pub filters: &'static [(&'static str, &'static str)],
}

/// Complete checklists at hotspots.
const COMPLETE_HOTSPOT_CHECKLISTS: &[(&str, &str)] = &[
    (columns::ALL_SPECIES_REPORTED, "1"),
    (columns::LOCALITY_TYPE, columns::HOTSPOT_LOCALITY_TYPE),
];

impl Projection {
    /// Projection for a dataset kind.
    ///
    /// Both kinds keep only complete checklists at hotspots, so every
    /// detection row has a matching sampling row.
    #[must_use]
    pub const fn for_kind(kind: DatasetKind) -> Self {
        match kind {
            DatasetKind::Species => Self {
                columns: columns::SPECIES_COLUMNS,
                filters: COMPLETE_HOTSPOT_CHECKLISTS,
            },
            DatasetKind::Sampling => Self {
                columns: columns::SAMPLING_COLUMNS,
                filters: COMPLETE_HOTSPOT_CHECKLISTS,
            },
        }
    }
}

/// Row counts from one projection run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionStats {
    /// Rows written.
    pub written: u64,
    /// Rows dropped by the filters.
    pub filtered: u64,
    /// Rows with fewer fields than the header.
    pub malformed: u64,
}

/// Projects `files.txt_gz` into `files.filtered`.
///
/// # Errors
///
/// Returns [`DatasetError::MissingInput`] if the gzip has not been
/// extracted, or any error from [`project_columns`].
pub fn project(
    files: &DatasetFiles,
    progress: &dyn ProgressCallback,
) -> Result<StepOutcome, DatasetError> {
    if let Some(skipped) = skip_if_exists(&files.filtered, "Filtered file") {
        return Ok(skipped);
    }
    if !files.txt_gz.exists() {
        return Err(DatasetError::MissingInput {
            what: "Gzipped file",
            path: files.txt_gz.clone(),
            step: "extract",
        });
    }

    let projection = Projection::for_kind(files.kind);
    log::info!("Input: {}", files.txt_gz.display());
    log::info!("Output: {}", files.filtered.display());
    log::info!("Extracting columns: {}", projection.columns.join(", "));

    let stats = project_columns(&files.txt_gz, &files.filtered, &projection, progress)?;
    log::info!(
        "Rows written: {}, filtered out: {}, malformed: {}",
        stats.written,
        stats.filtered,
        stats.malformed
    );

    Ok(StepOutcome::Done)
}

fn column_index(header: &csv::ByteRecord, name: &str) -> Option<usize> {
    header.iter().position(|h| h == name.as_bytes())
}

/// Streams a gzipped TSV through `projection` into a plain TSV.
///
/// Fields are copied as raw bytes; quoting is disabled on both sides
/// because eBird free text contains unbalanced `"`.
///
/// # Errors
///
/// Returns [`DatasetError::MissingColumns`] if the header lacks an output
/// or filter column, or an I/O or TSV error.
pub fn project_columns(
    input: &Path,
    output: &Path,
    projection: &Projection,
    progress: &dyn ProgressCallback,
) -> Result<ProjectionStats, DatasetError> {
    let start = Instant::now();
    let file = std::fs::File::open(input).map_err(|e| DatasetError::io(input, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(BufReader::with_capacity(1 << 20, MultiGzDecoder::new(file)));

    let header = reader
        .byte_headers()
        .map_err(|e| DatasetError::csv(input, e))?
        .clone();

    let mut missing = Vec::new();
    let output_idx: Vec<usize> = projection
        .columns
        .iter()
        .filter_map(|name| {
            let idx = column_index(&header, name);
            if idx.is_none() {
                missing.push((*name).to_string());
            }
            idx
        })
        .collect();
    let filter_idx: Vec<(usize, &[u8])> = projection
        .filters
        .iter()
        .filter_map(|(name, value)| {
            let idx = column_index(&header, name);
            if idx.is_none() && !missing.iter().any(|m| m == name) {
                missing.push((*name).to_string());
            }
            idx.map(|i| (i, value.as_bytes()))
        })
        .collect();
    if !missing.is_empty() {
        return Err(DatasetError::MissingColumns {
            path: input.to_path_buf(),
            columns: missing,
        });
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DatasetError::io(parent, e))?;
    }
    let tmp = partial_path(output);
    let out = std::fs::File::create(&tmp).map_err(|e| DatasetError::io(&tmp, e))?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(BufWriter::with_capacity(1 << 20, out));

    writer
        .write_record(projection.columns)
        .map_err(|e| DatasetError::csv(&tmp, e))?;

    let mut stats = ProjectionStats::default();
    let mut record = csv::ByteRecord::new();
    let mut projected = csv::ByteRecord::new();

    while reader
        .read_byte_record(&mut record)
        .map_err(|e| DatasetError::csv(input, e))?
    {
        if record.len() < header.len() {
            stats.malformed += 1;
            continue;
        }
        if !filter_idx.iter().all(|&(i, value)| &record[i] == value) {
            stats.filtered += 1;
            continue;
        }

        projected.clear();
        for &i in &output_idx {
            projected.push_field(&record[i]);
        }
        writer
            .write_byte_record(&projected)
            .map_err(|e| DatasetError::csv(&tmp, e))?;
        stats.written += 1;

        if stats.written % LOG_EVERY == 0 {
            progress.inc(LOG_EVERY);
            let elapsed = start.elapsed().as_secs_f64();
            #[allow(clippy::cast_precision_loss)]
            let rate = stats.written as f64 / elapsed.max(f64::EPSILON);
            log::info!("  Processed {} rows ({rate:.0} rows/sec)", stats.written);
        }
    }

    writer.flush().map_err(|e| DatasetError::io(&tmp, e))?;
    drop(writer);
    std::fs::rename(&tmp, output).map_err(|e| DatasetError::io(output, e))?;

    progress.finish(format!("{} rows", stats.written));
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write as _;

    use bird_targets_models::progress::NullProgress;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn write_gz(path: &Path, text: &str) {
        let file = fs::File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::fast());
        encoder.write_all(text.as_bytes()).unwrap();
        encoder.finish().unwrap();
    }

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("bird_targets_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn sampling_keeps_complete_hotspot_rows() {
        let dir = temp_dir("project_sampling");
        let input = dir.join("sampling.txt.gz");
        let output = dir.join("sampling.tsv");

        let header = "GLOBAL UNIQUE IDENTIFIER\tLOCALITY ID\tLOCALITY\tLOCALITY TYPE\tOBSERVATION DATE\tSAMPLING EVENT IDENTIFIER\tGROUP IDENTIFIER\tCOUNTRY CODE\tSTATE CODE\tCOUNTY CODE\tLATITUDE\tLONGITUDE\tALL SPECIES REPORTED\n";
        let rows = [
            "U1\tL1\tPark \"North\"\tH\t2024-05-01\tS1\t\tUS\tUS-NY\tUS-NY-061\t40.7\t-73.9\t1",
            "U2\tL2\tBackyard\tP\t2024-05-01\tS2\t\tUS\tUS-NY\t\t40.1\t-73.1\t1",
            "U3\tL1\tPark \"North\"\tH\t2024-05-02\tS3\tG1\tUS\tUS-NY\tUS-NY-061\t40.7\t-73.9\t0",
            "U4\tL1\tshort row",
        ];
        write_gz(&input, &format!("{header}{}\n", rows.join("\n")));

        let stats = project_columns(
            &input,
            &output,
            &Projection::for_kind(DatasetKind::Sampling),
            &NullProgress,
        )
        .unwrap();

        assert_eq!(
            stats,
            ProjectionStats {
                written: 1,
                filtered: 2,
                malformed: 1
            }
        );
        let text = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], columns::SAMPLING_COLUMNS.join("\t"));
        assert_eq!(
            lines[1],
            "L1\tPark \"North\"\t2024-05-01\tS1\t\tUS\tUS-NY\tUS-NY-061\t40.7\t-73.9"
        );
        assert!(!partial_path(&output).exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_filter_column_is_fatal() {
        let dir = temp_dir("project_missing");
        let input = dir.join("species.txt.gz");
        let output = dir.join("species.tsv");
        write_gz(&input, "LOCALITY ID\tSCIENTIFIC NAME\nL1\tTurdus migratorius\n");

        let err = project_columns(
            &input,
            &output,
            &Projection::for_kind(DatasetKind::Species),
            &NullProgress,
        )
        .unwrap_err();

        match err {
            DatasetError::MissingColumns { columns: missing, .. } => {
                assert!(missing.contains(&columns::ALL_SPECIES_REPORTED.to_string()));
                assert!(missing.contains(&columns::LOCALITY_TYPE.to_string()));
                assert!(!missing.contains(&columns::LOCALITY_ID.to_string()));
                let unique: std::collections::HashSet<_> = missing.iter().collect();
                assert_eq!(unique.len(), missing.len());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!output.exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
