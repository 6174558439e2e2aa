//! The output statistics database.
//!
//! Tables:
//!
//! * `species`: eBird taxonomy, IDs assigned in taxonomic order
//! * `month_obs` / `year_obs`: scored frequency rows keyed by species ID
//! * `locations`: resolved region codes for every sampled location
//! * `hotspots`: eBird hotspot reference data, written by the background
//!   download on its own connection
//!
//! Indexes are created only after the bulk load finishes.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use bird_targets_models::{FrequencyStat, HotspotRecord, SpeciesRecord, TimeBucket};
use bird_targets_region::ResolvedLocation;
use duckdb::{Connection, Statement};

use crate::{DbError, count_from_i64};

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 2_000;

/// Opens (or creates) the output database at `path`.
///
/// # Errors
///
/// Returns [`DbError`] if the parent directory cannot be created or the
/// connection fails.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Connection::open(path)?)
}

/// Opens an existing output database for reading.
///
/// # Errors
///
/// Returns [`DbError`] if the file is missing or cannot be opened.
pub fn open_read_only(path: &Path) -> Result<Connection, DbError> {
    if !path.exists() {
        return Err(DbError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("database not found: {}", path.display()),
        )));
    }
    let config = duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?;
    Ok(Connection::open_with_flags(path, config)?)
}

/// Drops and recreates the statistics tables.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails.
pub fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS species;
         DROP TABLE IF EXISTS month_obs;
         DROP TABLE IF EXISTS year_obs;
         DROP TABLE IF EXISTS locations;

         CREATE TABLE species (
             id BIGINT PRIMARY KEY,
             sci_name VARCHAR NOT NULL,
             name VARCHAR NOT NULL,
             code VARCHAR NOT NULL UNIQUE,
             taxon_order DOUBLE NOT NULL
         );

         CREATE TABLE month_obs (
             location_id VARCHAR NOT NULL,
             month TINYINT NOT NULL,
             species_id BIGINT NOT NULL,
             obs BIGINT NOT NULL,
             samples BIGINT NOT NULL,
             score DOUBLE NOT NULL
         );

         CREATE TABLE year_obs (
             location_id VARCHAR NOT NULL,
             species_id BIGINT NOT NULL,
             obs BIGINT NOT NULL,
             samples BIGINT NOT NULL,
             score DOUBLE NOT NULL
         );

         CREATE TABLE locations (
             id VARCHAR PRIMARY KEY,
             country_code VARCHAR NOT NULL,
             subnational1_code VARCHAR,
             subnational2_code VARCHAR,
             region_code VARCHAR NOT NULL,
             lat DOUBLE,
             lng DOUBLE
         );",
    )?;
    Ok(())
}

/// Drops and recreates the `hotspots` table.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails.
pub fn create_hotspots_table(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS hotspots;

         CREATE TABLE hotspots (
             id VARCHAR PRIMARY KEY,
             name VARCHAR,
             country_code VARCHAR,
             subnational1_code VARCHAR,
             subnational2_code VARCHAR,
             region_code VARCHAR,
             lat DOUBLE,
             lng DOUBLE,
             num_species BIGINT,
             num_checklists BIGINT
         );",
    )?;
    Ok(())
}

/// Runs a multi-row INSERT for every chunk of `rows`.
///
/// `bind` receives the statement, the first parameter index of the row,
/// and the row.
fn insert_chunked<T>(
    conn: &Connection,
    head: &str,
    width: usize,
    rows: &[T],
    bind: impl Fn(&mut Statement<'_>, usize, &T) -> duckdb::Result<()>,
) -> Result<u64, DbError> {
    let placeholders = format!("({})", vec!["?"; width].join(", "));
    let mut total = 0_u64;

    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut sql = format!("{head} VALUES ");
        for i in 0..chunk.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&placeholders);
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1_usize;
        for row in chunk {
            bind(&mut stmt, param_idx, row)?;
            param_idx += width;
        }

        let inserted = stmt.raw_execute()?;
        total += u64::try_from(inserted).unwrap_or(0);
    }

    Ok(total)
}

fn to_i64(value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::Conversion {
        message: format!("count {value} does not fit in BIGINT"),
    })
}

/// Inserts taxonomy rows.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails.
pub fn insert_species(conn: &Connection, species: &[SpeciesRecord]) -> Result<u64, DbError> {
    insert_chunked(
        conn,
        "INSERT INTO species (id, sci_name, name, code, taxon_order)",
        5,
        species,
        |stmt, i, sp| {
            stmt.raw_bind_parameter(i, sp.id)?;
            stmt.raw_bind_parameter(i + 1, &sp.sci_name)?;
            stmt.raw_bind_parameter(i + 2, &sp.name)?;
            stmt.raw_bind_parameter(i + 3, &sp.code)?;
            stmt.raw_bind_parameter(i + 4, sp.taxon_order)?;
            Ok(())
        },
    )
}

/// A frequency row ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredStat<'a> {
    /// eBird locality ID.
    pub location_id: &'a str,
    /// Month, or `None` for yearly rows.
    pub month: Option<u8>,
    /// Species ID from the `species` table.
    pub species_id: i64,
    /// Distinct observing surveys.
    pub obs: i64,
    /// Distinct surveys.
    pub samples: i64,
    /// Wilson lower bound.
    pub score: f64,
}

/// Species-keyed rows converted for storage, plus how many were dropped.
#[derive(Debug, Default)]
pub struct PreparedStats<'a> {
    /// Rows with a known species.
    pub rows: Vec<StoredStat<'a>>,
    /// Rows whose scientific name is not in the taxonomy.
    pub unknown_species: u64,
}

/// Maps stats onto species IDs by scientific name.
///
/// Rows for taxa outside the taxonomy (hybrids, spuhs, slashes) are
/// counted and dropped.
///
/// # Errors
///
/// Returns [`DbError::Conversion`] if a count does not fit in `BIGINT`.
pub fn prepare_stats<'a>(
    stats: impl IntoIterator<Item = &'a FrequencyStat>,
    species_ids: &HashMap<String, i64>,
) -> Result<PreparedStats<'a>, DbError> {
    let mut prepared = PreparedStats::default();
    for stat in stats {
        let Some(&species_id) = species_ids.get(&stat.species_key) else {
            prepared.unknown_species += 1;
            continue;
        };
        prepared.rows.push(StoredStat {
            location_id: &stat.location_id,
            month: stat.bucket.month(),
            species_id,
            obs: to_i64(stat.observations)?,
            samples: to_i64(stat.samples)?,
            score: stat.score,
        });
    }
    Ok(prepared)
}

/// Inserts monthly rows into `month_obs`.
///
/// # Errors
///
/// Returns [`DbError::Conversion`] if a row has no month, or a database
/// error if the insert fails.
pub fn insert_month_obs(conn: &Connection, rows: &[StoredStat<'_>]) -> Result<u64, DbError> {
    if let Some(row) = rows.iter().find(|r| r.month.is_none()) {
        return Err(DbError::Conversion {
            message: format!("yearly row for {} passed as monthly", row.location_id),
        });
    }
    insert_chunked(
        conn,
        "INSERT INTO month_obs (location_id, month, species_id, obs, samples, score)",
        6,
        rows,
        |stmt, i, row| {
            stmt.raw_bind_parameter(i, row.location_id)?;
            stmt.raw_bind_parameter(i + 1, row.month.map(i16::from))?;
            stmt.raw_bind_parameter(i + 2, row.species_id)?;
            stmt.raw_bind_parameter(i + 3, row.obs)?;
            stmt.raw_bind_parameter(i + 4, row.samples)?;
            stmt.raw_bind_parameter(i + 5, row.score)?;
            Ok(())
        },
    )
}

/// Inserts yearly rows into `year_obs`.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails.
pub fn insert_year_obs(conn: &Connection, rows: &[StoredStat<'_>]) -> Result<u64, DbError> {
    insert_chunked(
        conn,
        "INSERT INTO year_obs (location_id, species_id, obs, samples, score)",
        5,
        rows,
        |stmt, i, row| {
            stmt.raw_bind_parameter(i, row.location_id)?;
            stmt.raw_bind_parameter(i + 1, row.species_id)?;
            stmt.raw_bind_parameter(i + 2, row.obs)?;
            stmt.raw_bind_parameter(i + 3, row.samples)?;
            stmt.raw_bind_parameter(i + 4, row.score)?;
            Ok(())
        },
    )
}

/// Inserts resolved locations.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails.
pub fn insert_locations(
    conn: &Connection,
    locations: &BTreeMap<String, ResolvedLocation>,
) -> Result<u64, DbError> {
    let rows: Vec<(&String, &ResolvedLocation)> = locations.iter().collect();
    insert_chunked(
        conn,
        "INSERT INTO locations (id, country_code, subnational1_code, subnational2_code, region_code, lat, lng)",
        7,
        &rows,
        |stmt, i, (id, location)| {
            let region = &location.region;
            stmt.raw_bind_parameter(i, id.as_str())?;
            stmt.raw_bind_parameter(i + 1, &region.country_code)?;
            stmt.raw_bind_parameter(i + 2, region.subnational1_code.as_deref())?;
            stmt.raw_bind_parameter(i + 3, region.subnational2_code.as_deref())?;
            stmt.raw_bind_parameter(i + 4, &region.region_code)?;
            stmt.raw_bind_parameter(i + 5, location.point.map(|p| p.lat))?;
            stmt.raw_bind_parameter(i + 6, location.point.map(|p| p.lng))?;
            Ok(())
        },
    )
}

/// Inserts hotspots, resolving each one's region code.
///
/// Duplicate IDs keep the last record.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails.
pub fn insert_hotspots(conn: &Connection, hotspots: &[HotspotRecord]) -> Result<u64, DbError> {
    let mut last_seen: BTreeMap<&str, &HotspotRecord> = BTreeMap::new();
    for hotspot in hotspots {
        last_seen.insert(&hotspot.id, hotspot);
    }
    let rows: Vec<&HotspotRecord> = last_seen.into_values().collect();

    insert_chunked(
        conn,
        "INSERT OR REPLACE INTO hotspots (id, name, country_code, subnational1_code, subnational2_code, region_code, lat, lng, num_species, num_checklists)",
        10,
        &rows,
        |stmt, i, hs| {
            let region = bird_targets_region::resolve(
                Some(hs.country_code.as_str()),
                hs.subnational1_code.as_deref(),
                hs.subnational2_code.as_deref(),
            );
            stmt.raw_bind_parameter(i, &hs.id)?;
            stmt.raw_bind_parameter(i + 1, &hs.name)?;
            stmt.raw_bind_parameter(i + 2, &region.country_code)?;
            stmt.raw_bind_parameter(i + 3, region.subnational1_code.as_deref())?;
            stmt.raw_bind_parameter(i + 4, region.subnational2_code.as_deref())?;
            stmt.raw_bind_parameter(i + 5, &region.region_code)?;
            stmt.raw_bind_parameter(i + 6, hs.lat)?;
            stmt.raw_bind_parameter(i + 7, hs.lng)?;
            stmt.raw_bind_parameter(i + 8, hs.num_species.and_then(|n| i64::try_from(n).ok()))?;
            stmt.raw_bind_parameter(i + 9, hs.num_checklists.and_then(|n| i64::try_from(n).ok()))?;
            Ok(())
        },
    )
}

/// Creates the query indexes.
///
/// Hotspot indexes are only created when `with_hotspots` is set.
///
/// # Errors
///
/// Returns [`DbError`] if index creation fails.
pub fn create_indexes(conn: &Connection, with_hotspots: bool) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_mo_species_score ON month_obs (species_id, score);
         CREATE INDEX IF NOT EXISTS idx_yo_species_score ON year_obs (species_id, score);
         CREATE INDEX IF NOT EXISTS idx_mo_location ON month_obs (location_id, month, species_id);
         CREATE INDEX IF NOT EXISTS idx_yo_location ON year_obs (location_id, species_id);
         CREATE INDEX IF NOT EXISTS idx_locations_region ON locations (region_code);",
    )?;

    if with_hotspots {
        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_hotspots_country ON hotspots (country_code);
             CREATE INDEX IF NOT EXISTS idx_hotspots_subnational1 ON hotspots (subnational1_code);
             CREATE INDEX IF NOT EXISTS idx_hotspots_subnational2 ON hotspots (subnational2_code);
             CREATE INDEX IF NOT EXISTS idx_hotspots_region ON hotspots (region_code);",
        )?;
    }

    Ok(())
}

fn count(conn: &Connection, sql: &str) -> Result<u64, DbError> {
    let value: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    count_from_i64(value)
}

/// Row counts reported at the end of a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSummary {
    /// Rows in `month_obs`.
    pub month_rows: u64,
    /// Rows in `year_obs`.
    pub year_rows: u64,
    /// Distinct locations with monthly rows.
    pub locations: u64,
    /// Distinct species with monthly rows.
    pub species: u64,
}

/// Counts rows in the statistics tables.
///
/// # Errors
///
/// Returns [`DbError`] if a query fails.
pub fn summary(conn: &Connection) -> Result<StoreSummary, DbError> {
    Ok(StoreSummary {
        month_rows: count(conn, "SELECT COUNT(*) FROM month_obs")?,
        year_rows: count(conn, "SELECT COUNT(*) FROM year_obs")?,
        locations: count(conn, "SELECT COUNT(DISTINCT location_id) FROM month_obs")?,
        species: count(conn, "SELECT COUNT(DISTINCT species_id) FROM month_obs")?,
    })
}

/// Counts rows in `hotspots`, or 0 when the table does not exist.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn hotspot_count(conn: &Connection) -> Result<u64, DbError> {
    let exists = count(
        conn,
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'hotspots'",
    )?;
    if exists == 0 {
        return Ok(0);
    }
    count(conn, "SELECT COUNT(*) FROM hotspots")
}

/// Scientific name to species ID.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn species_ids(conn: &Connection) -> Result<HashMap<String, i64>, DbError> {
    let mut stmt = conn.prepare("SELECT sci_name, id FROM species")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    let mut ids = HashMap::new();
    for row in rows {
        let (sci_name, id) = row?;
        ids.insert(sci_name, id);
    }
    Ok(ids)
}

/// Species ID to eBird species code.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn species_codes(conn: &Connection) -> Result<BTreeMap<i64, String>, DbError> {
    let mut stmt = conn.prepare("SELECT id, code FROM species")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
    let mut codes = BTreeMap::new();
    for row in rows {
        let (id, code) = row?;
        codes.insert(id, code);
    }
    Ok(codes)
}

/// One `month_obs` row as read back for pack assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthObsRow {
    /// eBird locality ID.
    pub location_id: String,
    /// Month, 1-12.
    pub month: u8,
    /// Species ID.
    pub species_id: i64,
    /// Distinct observing surveys.
    pub obs: u64,
    /// Distinct surveys.
    pub samples: u64,
}

/// Monthly rows for every location whose region code starts with
/// `region`, ordered by location, month and species.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row is out of range.
pub fn month_obs_for_region(conn: &Connection, region: &str) -> Result<Vec<MonthObsRow>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT location_id, month, species_id, obs, samples
         FROM month_obs
         WHERE location_id IN (SELECT id FROM locations WHERE starts_with(region_code, ?))
         ORDER BY location_id, month, species_id",
    )?;
    let rows = stmt.query_map([region], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (location_id, month, species_id, obs, samples) = row?;
        let month = u8::try_from(month).map_err(|_| DbError::Conversion {
            message: format!("month {month} out of range"),
        })?;
        out.push(MonthObsRow {
            location_id,
            month,
            species_id,
            obs: count_from_i64(obs)?,
            samples: count_from_i64(samples)?,
        });
    }
    Ok(out)
}

/// Whether a stat is a monthly row.
#[must_use]
pub const fn is_monthly(stat: &FrequencyStat) -> bool {
    matches!(stat.bucket, TimeBucket::Month(_))
}
