//! Typed readers over projected TSV files.
//!
//! Used by the in-memory aggregation engine, which folds events one at a
//! time into a frequency index instead of grouping in `DuckDB`.

use std::io::BufReader;
use std::path::Path;

use bird_targets_models::{ChecklistEvent, DetectionEvent, columns};
use chrono::NaiveDate;

use crate::DatasetError;

/// Invalid rows reported individually before switching to a count.
const MAX_ROW_WARNINGS: u64 = 10;

/// Rows read and skipped by one reader pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Rows turned into events.
    pub events: u64,
    /// Rows skipped for a bad date, coordinate, or missing field.
    pub skipped: u64,
}

struct Columns<const N: usize> {
    idx: [usize; N],
}

impl<const N: usize> Columns<N> {
    fn locate(path: &Path, header: &csv::StringRecord, names: [&str; N]) -> Result<Self, DatasetError> {
        let mut idx = [0; N];
        let mut missing = Vec::new();
        for (slot, name) in idx.iter_mut().zip(names) {
            match header.iter().position(|h| h == name) {
                Some(i) => *slot = i,
                None => missing.push(name.to_string()),
            }
        }
        if missing.is_empty() {
            Ok(Self { idx })
        } else {
            Err(DatasetError::MissingColumns {
                path: path.to_path_buf(),
                columns: missing,
            })
        }
    }

    fn get<'r>(&self, record: &'r csv::StringRecord, field: usize) -> Option<&'r str> {
        record.get(self.idx[field])
    }
}

fn open(path: &Path) -> Result<csv::Reader<BufReader<std::fs::File>>, DatasetError> {
    let file = std::fs::File::open(path).map_err(|e| DatasetError::io(path, e))?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .from_reader(BufReader::with_capacity(1 << 20, file)))
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn skip_row(path: &Path, stats: &mut ReadStats, line: u64, reason: &str) {
    stats.skipped += 1;
    if stats.skipped <= MAX_ROW_WARNINGS {
        log::warn!("{}:{line}: skipping row ({reason})", path.display());
    } else if stats.skipped == MAX_ROW_WARNINGS + 1 {
        log::warn!("{}: further skipped rows are only counted", path.display());
    }
}

fn line_of(record: &csv::StringRecord) -> u64 {
    record.position().map_or(0, csv::Position::line)
}

/// Reads detection events from a projected species file.
///
/// Rows with an unparseable date or a blank key field are skipped with a
/// warning.
///
/// # Errors
///
/// Returns [`DatasetError::MissingColumns`] if a required column is
/// absent, or an I/O or TSV error.
pub fn read_detections(
    path: &Path,
    mut on_event: impl FnMut(DetectionEvent),
) -> Result<ReadStats, DatasetError> {
    const LOCATION: usize = 0;
    const DATE: usize = 1;
    const CHECKLIST: usize = 2;
    const GROUP: usize = 3;
    const SPECIES: usize = 4;

    let mut reader = open(path)?;
    let header = reader.headers().map_err(|e| DatasetError::csv(path, e))?.clone();
    let cols = Columns::locate(
        path,
        &header,
        [
            columns::LOCALITY_ID,
            columns::OBSERVATION_DATE,
            columns::SAMPLING_EVENT_IDENTIFIER,
            columns::GROUP_IDENTIFIER,
            columns::SCIENTIFIC_NAME,
        ],
    )?;

    let mut stats = ReadStats::default();
    let mut record = csv::StringRecord::new();

    while reader
        .read_record(&mut record)
        .map_err(|e| DatasetError::csv(path, e))?
    {
        let line = line_of(&record);
        let Some(date) = cols.get(&record, DATE).and_then(parse_date) else {
            skip_row(path, &mut stats, line, "invalid observation date");
            continue;
        };
        let (Some(location_id), Some(checklist_id), Some(species_key)) = (
            required(cols.get(&record, LOCATION)),
            required(cols.get(&record, CHECKLIST)),
            required(cols.get(&record, SPECIES)),
        ) else {
            skip_row(path, &mut stats, line, "missing identifier");
            continue;
        };

        on_event(DetectionEvent {
            location_id: location_id.to_string(),
            date,
            species_key: species_key.to_string(),
            checklist_id: checklist_id.to_string(),
            group_id: optional(cols.get(&record, GROUP)),
        });
        stats.events += 1;
    }

    Ok(stats)
}

/// Reads checklist events from a projected sampling file.
///
/// Rows with an unparseable date or coordinate, or a blank key field, are
/// skipped with a warning.
///
/// # Errors
///
/// Returns [`DatasetError::MissingColumns`] if a required column is
/// absent, or an I/O or TSV error.
pub fn read_checklists(
    path: &Path,
    mut on_event: impl FnMut(ChecklistEvent),
) -> Result<ReadStats, DatasetError> {
    const LOCATION: usize = 0;
    const DATE: usize = 1;
    const CHECKLIST: usize = 2;
    const GROUP: usize = 3;
    const COUNTRY: usize = 4;
    const STATE: usize = 5;
    const COUNTY: usize = 6;
    const LAT: usize = 7;
    const LNG: usize = 8;

    let mut reader = open(path)?;
    let header = reader.headers().map_err(|e| DatasetError::csv(path, e))?.clone();
    let cols = Columns::locate(
        path,
        &header,
        [
            columns::LOCALITY_ID,
            columns::OBSERVATION_DATE,
            columns::SAMPLING_EVENT_IDENTIFIER,
            columns::GROUP_IDENTIFIER,
            columns::COUNTRY_CODE,
            columns::STATE_CODE,
            columns::COUNTY_CODE,
            columns::LATITUDE,
            columns::LONGITUDE,
        ],
    )?;

    let mut stats = ReadStats::default();
    let mut record = csv::StringRecord::new();

    while reader
        .read_record(&mut record)
        .map_err(|e| DatasetError::csv(path, e))?
    {
        let line = line_of(&record);
        let Some(date) = cols.get(&record, DATE).and_then(parse_date) else {
            skip_row(path, &mut stats, line, "invalid observation date");
            continue;
        };
        let coordinate = |field| {
            cols.get(&record, field)
                .and_then(|v| v.trim().parse::<f64>().ok())
        };
        let (Some(lat), Some(lng)) = (coordinate(LAT), coordinate(LNG)) else {
            skip_row(path, &mut stats, line, "invalid coordinate");
            continue;
        };
        let (Some(location_id), Some(checklist_id)) = (
            required(cols.get(&record, LOCATION)),
            required(cols.get(&record, CHECKLIST)),
        ) else {
            skip_row(path, &mut stats, line, "missing identifier");
            continue;
        };

        on_event(ChecklistEvent {
            location_id: location_id.to_string(),
            date,
            checklist_id: checklist_id.to_string(),
            group_id: optional(cols.get(&record, GROUP)),
            country_code: optional(cols.get(&record, COUNTRY)),
            subnational1_code: optional(cols.get(&record, STATE)),
            subnational2_code: optional(cols.get(&record, COUNTY)),
            lat,
            lng,
        });
        stats.events += 1;
    }

    Ok(stats)
}
