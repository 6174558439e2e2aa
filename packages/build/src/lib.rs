#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Builds the targets database from projected eBird files.
//!
//! The build is a numbered sequence of steps run on one connection. The
//! hotspot reference download runs alongside it as a background task on
//! a second connection; its log output is held back until the main steps
//! are done, and the build joins it before creating indexes.
//!
//! The database is written to a `.partial` file next to the output and
//! renamed over it only after the last step, so a failed build never
//! leaves an incomplete database at the output path.

pub mod engine;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bird_targets_database::scan::{self, ScanSettings};
use bird_targets_database::store::{self, StoreSummary};
use bird_targets_database::{DbError, ScanError};
use bird_targets_dataset::{DatasetError, partial_path};
use bird_targets_ebird::background::{
    self, DeferredLog, HotspotOutcome, deferred_log, join_hotspot_download,
    spawn_hotspot_download,
};
use bird_targets_ebird::{API_BASE_URL, EbirdClient, EbirdError};
use bird_targets_models::{MONTHS, columns};
use bird_targets_models::progress::ProgressCallback;
use bird_targets_region::LocationRegions;
use bird_targets_stats::aggregate::months;
use bird_targets_stats::{AggregateError, GroupedCounts, Scorer, StatTables, build_stats};
use duckdb::Connection;
use strum_macros::Display;
use thiserror::Error;

pub use engine::Engine;

/// Number of numbered steps in a build.
const TOTAL_STEPS: usize = 9;

/// Pipeline stage, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Stage {
    /// Validating the input files.
    #[strum(to_string = "Checking input files")]
    Inputs,
    /// Creating the output database and loading the taxonomy.
    #[strum(to_string = "Loading taxonomy")]
    Taxonomy,
    /// Starting the hotspot download.
    #[strum(to_string = "Starting hotspot download")]
    Hotspots,
    /// Joining the hotspot download.
    #[strum(to_string = "Finishing hotspot download")]
    HotspotJoin,
    /// Grouping surveys.
    #[strum(to_string = "Counting surveys")]
    Count,
    /// Scoring grouped counts.
    #[strum(to_string = "Scoring")]
    Score,
    /// Writing statistics rows.
    #[strum(to_string = "Writing statistics")]
    Store,
    /// Writing location regions.
    #[strum(to_string = "Writing locations")]
    Locations,
    /// Creating indexes after the bulk load.
    #[strum(to_string = "Creating indexes")]
    Indexes,
    /// Counting what was written.
    #[strum(to_string = "Summarizing")]
    Summary,
}

/// Errors raised inside a stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// Output database error.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Input scan error.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Input read error.
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// Aggregation error.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// eBird request error.
    #[error(transparent)]
    Ebird(#[from] EbirdError),

    /// A required input file does not exist.
    #[error("{what} not found: {}", .path.display())]
    MissingInput {
        /// Description of the file.
        what: &'static str,
        /// Expected path.
        path: PathBuf,
    },
}

/// A failed build, labelled with the stage that failed.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct BuildError {
    /// Stage that failed.
    pub stage: Stage,
    /// Underlying error.
    #[source]
    pub source: StageError,
}

/// Attaches a [`Stage`] to a stage-level result.
pub trait StageContext<T> {
    /// Wraps the error, if any, in a [`BuildError`] for `stage`.
    ///
    /// # Errors
    ///
    /// Returns the wrapped error.
    fn stage(self, stage: Stage) -> Result<T, BuildError>;
}

impl<T, E: Into<StageError>> StageContext<T> for Result<T, E> {
    fn stage(self, stage: Stage) -> Result<T, BuildError> {
        self.map_err(|e| BuildError {
            stage,
            source: e.into(),
        })
    }
}

/// Inputs and knobs for one build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Projected species file.
    pub species_file: PathBuf,
    /// Projected sampling file.
    pub sampling_file: PathBuf,
    /// Output database; replaced only when the build succeeds.
    pub output_db: PathBuf,
    /// Limits for the `DuckDB` scan engine.
    pub scan: ScanSettings,
    /// Counting engine.
    pub engine: Engine,
    /// Wilson score z.
    pub wilson_z: f64,
    /// eBird API key, needed for the hotspot download.
    pub api_key: Option<String>,
    /// Skip the hotspot download.
    pub skip_hotspots: bool,
    /// Pause between per-country hotspot requests.
    pub hotspot_delay: Duration,
    /// eBird API base URL.
    pub ebird_base_url: String,
}

impl BuildOptions {
    /// Options with the default engine, z, and hotspot delay.
    #[must_use]
    pub fn new(species_file: PathBuf, sampling_file: PathBuf, output_db: PathBuf) -> Self {
        Self {
            species_file,
            sampling_file,
            output_db,
            scan: ScanSettings::default(),
            engine: Engine::default(),
            wilson_z: bird_targets_stats::DEFAULT_WILSON_Z,
            api_key: None,
            skip_hotspots: false,
            hotspot_delay: background::DEFAULT_REQUEST_DELAY,
            ebird_base_url: API_BASE_URL.to_string(),
        }
    }
}

/// What a finished build wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSummary {
    /// Statistics row counts.
    pub store: StoreSummary,
    /// Rows dropped because their species is not in the taxonomy.
    pub unknown_species: u64,
    /// How the hotspot download ended.
    pub hotspots: HotspotOutcome,
    /// Rows in the `hotspots` table.
    pub hotspot_rows: u64,
    /// Wall-clock time of the whole build.
    pub elapsed: Duration,
}

/// Rows written by [`store_statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoredCounts {
    /// Rows in `month_obs`.
    pub monthly: u64,
    /// Rows in `year_obs`.
    pub yearly: u64,
    /// Rows in `locations`.
    pub locations: u64,
    /// Rows dropped for an unknown species.
    pub unknown_species: u64,
}

fn step(n: usize, stage: Stage) -> Instant {
    log::info!("Step {n}/{TOTAL_STEPS}: {stage}...");
    Instant::now()
}

fn step_done(start: Instant) {
    log::info!("  done in {:.1}s", start.elapsed().as_secs_f64());
}

fn require_file(path: &Path, what: &'static str) -> Result<(), BuildError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(BuildError {
            stage: Stage::Inputs,
            source: StageError::MissingInput {
                what,
                path: path.to_path_buf(),
            },
        })
    }
}

fn wal_path(path: &Path) -> PathBuf {
    let mut wal = path.as_os_str().to_os_string();
    wal.push(".wal");
    PathBuf::from(wal)
}

/// Removes a database file and its write-ahead log.
fn remove_database(path: &Path) -> Result<(), DbError> {
    for file in [path.to_path_buf(), wal_path(path)] {
        match std::fs::remove_file(&file) {
            Ok(()) => log::info!("  Removed {}", file.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Replaces `output` with the finished database at `partial`.
fn publish(partial: &Path, output: &Path) -> Result<(), DbError> {
    remove_database(output)?;
    std::fs::rename(partial, output)?;
    let partial_wal = wal_path(partial);
    if partial_wal.exists() {
        std::fs::rename(partial_wal, wal_path(output))?;
    }
    Ok(())
}

fn scorer(wilson_z: f64, stage: Stage) -> Result<Scorer, BuildError> {
    Scorer::new(wilson_z).map_err(AggregateError::from).stage(stage)
}

/// Scores grouped counts.
///
/// # Errors
///
/// Returns [`BuildError`] at [`Stage::Score`] if `wilson_z` is unusable,
/// an observation group has no samples, or a row cannot be scored.
pub fn score(counts: &GroupedCounts, wilson_z: f64) -> Result<StatTables, BuildError> {
    let scorer = scorer(wilson_z, Stage::Score)?;
    build_stats(counts, &scorer).stage(Stage::Score)
}

/// Writes scored rows and location regions, month by month.
///
/// `progress` advances once per month and once for the yearly table.
///
/// # Errors
///
/// Returns [`BuildError`] at [`Stage::Store`] or [`Stage::Locations`] if
/// an insert fails.
pub fn store_statistics(
    conn: &Connection,
    tables: &StatTables,
    regions: LocationRegions,
    progress: &dyn ProgressCallback,
) -> Result<StoredCounts, BuildError> {
    let species_ids = store::species_ids(conn).stage(Stage::Store)?;
    let mut stored = StoredCounts::default();

    progress.set_total(MONTHS as u64 + 1);
    for month in months() {
        let prepared = store::prepare_stats(tables.month(month), &species_ids).stage(Stage::Store)?;
        let inserted = store::insert_month_obs(conn, &prepared.rows).stage(Stage::Store)?;
        log::info!("  Month {month:>2}: {inserted} rows");
        stored.monthly += inserted;
        stored.unknown_species += prepared.unknown_species;
        progress.inc(1);
    }

    let prepared = store::prepare_stats(&tables.yearly, &species_ids).stage(Stage::Store)?;
    stored.yearly = store::insert_year_obs(conn, &prepared.rows).stage(Stage::Store)?;
    stored.unknown_species += prepared.unknown_species;
    log::info!("  Year: {} rows", stored.yearly);
    progress.inc(1);
    progress.finish_and_clear();

    if stored.unknown_species > 0 {
        log::warn!(
            "  Dropped {} rows for taxa outside the species taxonomy",
            stored.unknown_species
        );
    }

    let resolved = regions.resolve();
    stored.locations = store::insert_locations(conn, &resolved).stage(Stage::Locations)?;
    log::info!("  {} locations", stored.locations);

    Ok(stored)
}

/// Runs a full build.
///
/// Must run inside a multi-threaded Tokio runtime so the hotspot
/// download progresses while the main steps block.
///
/// # Errors
///
/// Returns [`BuildError`] labelled with the failing stage. A failed
/// hotspot download is not an error; it is reported in the summary. On
/// error the output path is left as it was before the build.
#[allow(clippy::future_not_send)]
pub async fn build_database(
    options: &BuildOptions,
    progress: &dyn ProgressCallback,
) -> Result<BuildSummary, BuildError> {
    let start = Instant::now();

    let t = step(1, Stage::Inputs);
    require_file(&options.species_file, "Species file")?;
    require_file(&options.sampling_file, "Sampling file")?;
    scan::check_columns(&options.species_file, columns::DETECTION_REQUIRED).stage(Stage::Inputs)?;
    scan::check_columns(&options.sampling_file, columns::CHECKLIST_REQUIRED)
        .stage(Stage::Inputs)?;
    scorer(options.wilson_z, Stage::Inputs)?;
    step_done(t);

    let partial = partial_path(&options.output_db);
    let built = build_into(&partial, options, progress, start).await;

    let summary = match built {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(cleanup) = remove_database(&partial) {
                log::warn!("Could not remove {}: {cleanup}", partial.display());
            }
            return Err(e);
        }
    };

    publish(&partial, &options.output_db).stage(Stage::Summary)?;
    log_summary(&options.output_db, &summary);

    Ok(summary)
}

/// Steps 2 to 9, writing the database at `db_path`.
///
/// Both connections are closed when this returns.
#[allow(clippy::future_not_send)]
async fn build_into(
    db_path: &Path,
    options: &BuildOptions,
    progress: &dyn ProgressCallback,
    start: Instant,
) -> Result<BuildSummary, BuildError> {
    let t = step(2, Stage::Taxonomy);
    remove_database(db_path).stage(Stage::Taxonomy)?;
    let conn = store::open(db_path).stage(Stage::Taxonomy)?;
    store::create_schema(&conn).stage(Stage::Taxonomy)?;
    let client = EbirdClient::new(options.api_key.clone())
        .stage(Stage::Taxonomy)?
        .with_base_url(&options.ebird_base_url);
    let taxonomy = client.fetch_taxonomy().await.stage(Stage::Taxonomy)?;
    let species = store::insert_species(&conn, &taxonomy).stage(Stage::Taxonomy)?;
    log::info!("  {species} species");
    step_done(t);

    let t = step(3, Stage::Hotspots);
    let (log_tx, deferred) = deferred_log();
    let mut skip_reason = None;
    let download = if options.skip_hotspots {
        log::info!("  Skipped (--skip-hotspots)");
        skip_reason = Some("--skip-hotspots");
        None
    } else if client.has_api_key() {
        let hotspot_conn = conn.try_clone().map_err(DbError::from).stage(Stage::Hotspots)?;
        log::info!("  Running in the background; output follows the main steps");
        Some(spawn_hotspot_download(
            client.clone(),
            hotspot_conn,
            log_tx.clone(),
            options.hotspot_delay,
        ))
    } else {
        log::warn!("  No eBird API key configured; hotspots will not be loaded");
        skip_reason = Some("no API key");
        None
    };
    drop(log_tx);
    step_done(t);

    let stored = match count_score_store(&conn, options, progress) {
        Ok(stored) => stored,
        Err(e) => {
            if let Some(handle) = &download {
                handle.abort();
            }
            return Err(e);
        }
    };

    let t = step(7, Stage::HotspotJoin);
    let hotspots = finish_hotspots(download, deferred, skip_reason.unwrap_or_default()).await;
    match &hotspots {
        HotspotOutcome::Failed(reason) => log::warn!("  Hotspot download failed: {reason}"),
        outcome => log::info!("  Hotspots: {outcome}"),
    }
    step_done(t);

    let t = step(8, Stage::Indexes);
    let with_hotspots = matches!(hotspots, HotspotOutcome::Loaded(_));
    store::create_indexes(&conn, with_hotspots).stage(Stage::Indexes)?;
    step_done(t);

    let t = step(9, Stage::Summary);
    let summary = BuildSummary {
        store: store::summary(&conn).stage(Stage::Summary)?,
        unknown_species: stored.unknown_species,
        hotspot_rows: store::hotspot_count(&conn).stage(Stage::Summary)?,
        hotspots,
        elapsed: start.elapsed(),
    };
    step_done(t);

    Ok(summary)
}

/// Steps 4 to 6, run while the hotspot download is in flight.
fn count_score_store(
    conn: &Connection,
    options: &BuildOptions,
    progress: &dyn ProgressCallback,
) -> Result<StoredCounts, BuildError> {
    let t = step(4, Stage::Count);
    log::info!("  Engine: {}", options.engine);
    let counted = engine::count(
        options.engine,
        &options.species_file,
        &options.sampling_file,
        &options.scan,
    )?;
    step_done(t);

    let t = step(5, Stage::Score);
    let tables = score(&counted.counts, options.wilson_z)?;
    drop(counted.counts);
    log::info!(
        "  {} monthly and {} yearly rows kept",
        tables.monthly.len(),
        tables.yearly.len()
    );
    step_done(t);

    let t = step(6, Stage::Store);
    let stored = store_statistics(conn, &tables, counted.regions, progress)?;
    step_done(t);

    Ok(stored)
}

async fn finish_hotspots(
    download: Option<tokio::task::JoinHandle<Result<u64, EbirdError>>>,
    deferred: DeferredLog,
    skip_reason: &str,
) -> HotspotOutcome {
    let forwarder = deferred.go_live();
    let outcome = match download {
        Some(handle) => {
            log::info!("  Waiting for the hotspot download to finish...");
            join_hotspot_download(handle).await
        }
        None => HotspotOutcome::Skipped(skip_reason.to_string()),
    };
    // every sender is gone once the task has finished
    if let Err(e) = forwarder.await {
        log::warn!("Hotspot log forwarder stopped: {e}");
    }
    outcome
}

fn log_summary(output_db: &Path, summary: &BuildSummary) {
    log::info!("Build complete: {}", output_db.display());
    log::info!("  month_obs rows: {}", summary.store.month_rows);
    log::info!("  year_obs rows: {}", summary.store.year_rows);
    log::info!("  locations: {}", summary.store.locations);
    log::info!("  species: {}", summary.store.species);
    log::info!("  hotspots: {} ({})", summary.hotspot_rows, summary.hotspots);
    log::info!("  total time: {:.1}s", summary.elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use std::io::{Read as _, Write as _};
    use std::net::TcpListener;

    use bird_targets_models::progress::NullProgress;
    use bird_targets_models::{ChecklistEvent, DetectionEvent, SpeciesRecord};
    use bird_targets_stats::{FrequencyIndex, ScoreError};

    use super::*;

    fn species(id: i64, sci_name: &str, code: &str) -> SpeciesRecord {
        SpeciesRecord {
            id,
            sci_name: sci_name.to_string(),
            name: code.to_string(),
            code: code.to_string(),
            taxon_order: f64::from(u32::try_from(id).unwrap()),
        }
    }

    fn checklist(location: &str, date: &str, id: &str) -> ChecklistEvent {
        ChecklistEvent {
            location_id: location.to_string(),
            date: date.parse().unwrap(),
            checklist_id: id.to_string(),
            group_id: None,
            country_code: Some("US".to_string()),
            subnational1_code: Some("US-CA".to_string()),
            subnational2_code: Some("US-CA-085".to_string()),
            lat: 37.1,
            lng: -122.1,
        }
    }

    fn detection(location: &str, date: &str, id: &str, species: &str) -> DetectionEvent {
        DetectionEvent {
            location_id: location.to_string(),
            date: date.parse().unwrap(),
            species_key: species.to_string(),
            checklist_id: id.to_string(),
            group_id: None,
        }
    }

    const SAMPLING_HEADER: &str = "LOCALITY ID\tLOCALITY\tOBSERVATION DATE\tSAMPLING EVENT IDENTIFIER\tGROUP IDENTIFIER\tCOUNTRY CODE\tSTATE CODE\tCOUNTY CODE\tLATITUDE\tLONGITUDE";
    const SPECIES_HEADER: &str = "LOCALITY ID\tLOCALITY\tLOCALITY TYPE\tLATITUDE\tLONGITUDE\tOBSERVATION DATE\tSAMPLING EVENT IDENTIFIER\tALL SPECIES REPORTED\tGROUP IDENTIFIER\tCATEGORY\tSCIENTIFIC NAME";

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bird_targets_build_{tag}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Serves `body` as JSON to a single request.
    fn serve_json(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0_u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{addr}")
    }

    fn run(options: &BuildOptions) -> Result<BuildSummary, BuildError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(build_database(options, &NullProgress))
    }

    #[test]
    fn stage_labels_read_as_sentences() {
        let err = BuildError {
            stage: Stage::Inputs,
            source: StageError::MissingInput {
                what: "Species file",
                path: PathBuf::from("/data/species.tsv"),
            },
        };
        assert_eq!(
            err.to_string(),
            "Checking input files failed: Species file not found: /data/species.tsv"
        );
    }

    #[test]
    fn orphaned_observations_fail_scoring() {
        let mut counts = GroupedCounts::default();
        counts.set_observations("L1", 3, "Corvus corax", 4);
        let err = score(&counts, 1.96).unwrap_err();
        assert_eq!(err.stage, Stage::Score);
        assert!(matches!(
            err.source,
            StageError::Aggregate(AggregateError::MissingSamples { .. })
        ));
    }

    #[test]
    fn statistics_are_stored_by_species_id() {
        let conn = Connection::open_in_memory().unwrap();
        store::create_schema(&conn).unwrap();
        store::insert_species(
            &conn,
            &[
                species(1, "Turdus migratorius", "amerob"),
                species(2, "Corvus corax", "comrav"),
            ],
        )
        .unwrap();

        let mut index = FrequencyIndex::new();
        let mut regions = LocationRegions::new();
        for (date, id) in [("2024-05-01", "S1"), ("2024-05-02", "S2"), ("2024-05-03", "S3")] {
            let event = checklist("L1", date, id);
            index.add_checklist(&event);
            regions.observe(&event);
        }
        for id in ["S1", "S2"] {
            index.add_detection(&detection("L1", "2024-05-01", id, "Turdus migratorius"));
            index.add_detection(&detection("L1", "2024-05-01", id, "Turdus x hybrid"));
        }
        index.add_detection(&detection("L1", "2024-05-03", "S3", "Corvus corax"));

        let tables = score(&index.freeze(), 1.96).unwrap();
        let stored = store_statistics(&conn, &tables, regions, &NullProgress).unwrap();

        assert_eq!(stored.monthly, 1);
        assert_eq!(stored.yearly, 1);
        assert_eq!(stored.locations, 1);
        assert_eq!(stored.unknown_species, 2);

        let rows = store::month_obs_for_region(&conn, "US-CA").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].species_id, 1);
        assert_eq!(rows[0].month, 5);
        assert_eq!(rows[0].obs, 2);
        assert_eq!(rows[0].samples, 3);
    }

    #[test]
    fn unusable_z_fails_before_the_database_is_touched() {
        let dir = scratch_dir("bad_z");
        let species = dir.join("species.tsv");
        let sampling = dir.join("sampling.tsv");
        std::fs::write(&species, format!("{SPECIES_HEADER}\n")).unwrap();
        std::fs::write(&sampling, format!("{SAMPLING_HEADER}\n")).unwrap();

        for z in [0.0, -1.0, f64::NAN] {
            let mut options = BuildOptions::new(species.clone(), sampling.clone(), dir.join("targets.db"));
            options.wilson_z = z;
            let err = run(&options).unwrap_err();
            assert_eq!(err.stage, Stage::Inputs, "z={z}");
            assert!(matches!(
                err.source,
                StageError::Aggregate(AggregateError::Score(ScoreError::InvalidZ { .. }))
            ));
            assert!(!dir.join("targets.db").exists());
        }
    }

    #[test]
    fn failed_build_leaves_no_database_behind() {
        let dir = scratch_dir("failed");
        let species = dir.join("species.tsv");
        let sampling = dir.join("sampling.tsv");
        std::fs::write(
            &sampling,
            format!("{SAMPLING_HEADER}\nL1\tPark\t2024-05-01\tS1\t\tUS\tUS-CA\tUS-CA-085\t37.1\t-122.1\n"),
        )
        .unwrap();
        // L9 has observations but was never sampled
        std::fs::write(
            &species,
            format!(
                "{SPECIES_HEADER}\n\
                 L9\tMarsh\tH\t1.0\t2.0\t2024-05-01\tS8\t1\t\tspecies\tCorvus corax\n\
                 L9\tMarsh\tH\t1.0\t2.0\t2024-05-02\tS9\t1\t\tspecies\tCorvus corax\n"
            ),
        )
        .unwrap();

        let output = dir.join("targets-dec-2025.db");
        let mut options = BuildOptions::new(species, sampling, output.clone());
        options.engine = Engine::Memory;
        options.skip_hotspots = true;
        options.ebird_base_url = serve_json(
            r#"[{"sciName": "Corvus corax", "comName": "Common Raven", "speciesCode": "comrav", "taxonOrder": 1.0}]"#,
        );

        let err = run(&options).unwrap_err();
        assert_eq!(err.stage, Stage::Score);
        assert!(!output.exists());
        assert!(!partial_path(&output).exists());
    }

    #[test]
    fn missing_inputs_fail_before_the_database_is_touched() {
        let dir = std::env::temp_dir().join(format!("bird_targets_build_{}", std::process::id()));
        let options = BuildOptions::new(
            dir.join("missing_species.tsv"),
            dir.join("missing_sampling.tsv"),
            dir.join("targets.db"),
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let err = runtime
            .block_on(build_database(&options, &NullProgress))
            .unwrap_err();

        assert_eq!(err.stage, Stage::Inputs);
        assert!(!dir.join("targets.db").exists());
    }
}
