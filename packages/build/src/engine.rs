//! Counting engines.
//!
//! Both engines turn the projected species and sampling files into the
//! same [`GroupedCounts`] and per-location region fields. `DuckDB` groups
//! out of core and handles full releases; the in-memory engine folds
//! events through a [`FrequencyIndex`] and suits small extracts.

use std::path::Path;

use bird_targets_database::scan::{ScanSettings, Scanner};
use bird_targets_dataset::events::{read_checklists, read_detections};
use bird_targets_region::LocationRegions;
use bird_targets_stats::{FrequencyIndex, GroupedCounts};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{BuildError, Stage, StageContext as _};

/// Which engine groups the input files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Engine {
    /// Out-of-core grouping in `DuckDB`.
    #[default]
    Duckdb,
    /// Event-by-event folding in process memory.
    Memory,
}

/// Grouped counts and location fields from one engine pass.
#[derive(Debug, Default)]
pub struct Counted {
    /// Samples and observations per bucket.
    pub counts: GroupedCounts,
    /// Region fields per sampled location.
    pub regions: LocationRegions,
}

/// Counts distinct surveys in the projected files.
///
/// # Errors
///
/// Returns [`BuildError`] at [`Stage::Count`] if a file cannot be read or
/// the grouping query fails.
pub fn count(
    engine: Engine,
    species_file: &Path,
    sampling_file: &Path,
    scan: &ScanSettings,
) -> Result<Counted, BuildError> {
    match engine {
        Engine::Duckdb => count_duckdb(species_file, sampling_file, scan),
        Engine::Memory => count_in_memory(species_file, sampling_file),
    }
}

fn count_duckdb(
    species_file: &Path,
    sampling_file: &Path,
    scan: &ScanSettings,
) -> Result<Counted, BuildError> {
    let scanner = Scanner::open(scan).stage(Stage::Count)?;
    let mut counted = Counted::default();

    let groups = scanner
        .samples(sampling_file, &mut counted.counts)
        .stage(Stage::Count)?;
    log::info!("  {groups} (location, month) sample groups");

    let groups = scanner
        .observations(species_file, &mut counted.counts)
        .stage(Stage::Count)?;
    log::info!("  {groups} (location, month, species) observation groups");

    let locations = scanner
        .locations(sampling_file, &mut counted.regions)
        .stage(Stage::Count)?;
    log::info!("  {locations} sampled locations");

    Ok(counted)
}

fn count_in_memory(species_file: &Path, sampling_file: &Path) -> Result<Counted, BuildError> {
    let mut index = FrequencyIndex::new();
    let mut regions = LocationRegions::new();

    let read = read_checklists(sampling_file, |event| {
        index.add_checklist(&event);
        regions.observe(&event);
    })
    .stage(Stage::Count)?;
    log::info!(
        "  {} checklist rows read, {} skipped",
        read.events,
        read.skipped
    );

    let read = read_detections(species_file, |event| index.add_detection(&event))
        .stage(Stage::Count)?;
    log::info!(
        "  {} detection rows read, {} skipped",
        read.events,
        read.skipped
    );

    let counts = index.freeze();
    log::info!(
        "  {} sample groups, {} observation groups, {} locations",
        counts.sample_groups(),
        counts.observations.len(),
        regions.len()
    );

    Ok(Counted { counts, regions })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use bird_targets_models::GeoPoint;

    use super::*;

    const SAMPLING_HEADER: &str = "LOCALITY ID\tLOCALITY\tOBSERVATION DATE\tSAMPLING EVENT IDENTIFIER\tGROUP IDENTIFIER\tCOUNTRY CODE\tSTATE CODE\tCOUNTY CODE\tLATITUDE\tLONGITUDE";
    const SPECIES_HEADER: &str = "LOCALITY ID\tLOCALITY\tLOCALITY TYPE\tLATITUDE\tLONGITUDE\tOBSERVATION DATE\tSAMPLING EVENT IDENTIFIER\tALL SPECIES REPORTED\tGROUP IDENTIFIER\tCATEGORY\tSCIENTIFIC NAME";

    fn write_tsv(dir: &Path, name: &str, header: &str, rows: &[&str]) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        let mut contents = format!("{header}\n");
        for row in rows {
            contents.push_str(row);
            contents.push('\n');
        }
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn fixture(tag: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "bird_targets_engine_{tag}_{}",
            std::process::id()
        ));
        let sampling = write_tsv(
            &dir,
            "sampling.tsv",
            SAMPLING_HEADER,
            &[
                "L1\tPark\t2024-05-01\tS1\tG1\tUS\tUS-CA\tUS-CA-085\t37.1\t-122.1",
                "L1\tPark\t2024-05-01\tS2\tG1\tUS\tUS-CA\tUS-CA-085\t37.1\t-122.1",
                "L1\tPark\t2024-05-09\tS3\t\tUS\tUS-CA\tUS-CA-085\t37.1\t-122.1",
                "L1\tPark\t2024-06-09\tS4\t\tUS\tUS-CA\tUS-CA-085\t37.2\t-122.0",
                "L1\tPark\t2024-06-10\tS6\t\tUS\tUS-CA\tUS-CA-085\t37.0\t-122.2",
                "L2\tLake\t2024-05-02\tS5\t\tCO\tCO-\t\t4.6\t-74.1",
            ],
        );
        let species = write_tsv(
            &dir,
            "species.tsv",
            SPECIES_HEADER,
            &[
                "L1\tPark\tH\t37.1\t-122.1\t2024-05-01\tS1\t1\tG1\tspecies\tTurdus migratorius",
                "L1\tPark\tH\t37.1\t-122.1\t2024-05-01\tS2\t1\tG1\tspecies\tTurdus migratorius",
                "L1\tPark\tH\t37.1\t-122.1\t2024-05-09\tS3\t1\t\tspecies\tTurdus migratorius",
                "L1\tPark\tH\t37.1\t-122.1\t2024-06-09\tS4\t1\t\tspecies\tCorvus corax",
            ],
        );
        (species, sampling)
    }

    #[test]
    fn engine_names_parse() {
        assert_eq!("duckdb".parse::<Engine>().unwrap(), Engine::Duckdb);
        assert_eq!("memory".parse::<Engine>().unwrap(), Engine::Memory);
        assert!("sqlite".parse::<Engine>().is_err());
        assert_eq!(Engine::default().to_string(), "duckdb");
    }

    #[test]
    fn engines_agree() {
        let (species, sampling) = fixture("agree");
        let scan = ScanSettings::default();

        let duck = count(Engine::Duckdb, &species, &sampling, &scan).unwrap();
        let memory = count(Engine::Memory, &species, &sampling, &scan).unwrap();

        assert_eq!(duck.counts, memory.counts);
        assert_eq!(duck.counts.samples["L1"][&5], 2);
        assert_eq!(duck.counts.samples["L1"][&6], 2);

        let robin = ("L1".to_string(), 5, "Turdus migratorius".to_string());
        assert_eq!(memory.counts.observations[&robin], 2);

        let duck_regions = duck.regions.resolve();
        let memory_regions = memory.regions.resolve();
        assert_eq!(duck_regions.len(), 2);
        assert_eq!(duck_regions, memory_regions);
        assert_eq!(
            memory_regions["L1"].point,
            Some(GeoPoint::new(37.2, -122.0))
        );
        assert_eq!(memory_regions["L2"].region.region_code, "CO");
    }

    #[test]
    fn missing_file_is_a_count_failure() {
        let missing = std::env::temp_dir().join("bird_targets_engine_missing.tsv");
        let err = count(Engine::Memory, &missing, &missing, &ScanSettings::default()).unwrap_err();
        assert_eq!(err.stage, Stage::Count);
    }
}
