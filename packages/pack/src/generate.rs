//! Pack generation over all (or one) pack definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use bird_targets_cluster::{ClusterParams, generate_clusters};
use bird_targets_database::store;
use bird_targets_ebird::EbirdClient;
use bird_targets_models::GeoPoint;
use bird_targets_models::pack::{PackDefinition, PackIndex, PackIndexEntry};
use duckdb::Connection;

use crate::assemble::{RegionNames, assemble_pack, timestamp_now, write_index, write_pack};
use crate::obs_map::MonthObsMap;
use crate::PackError;

/// Pause between per-pack hotspot requests.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(1);

/// Inputs shared by every pack in a run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Directory receiving `packs.json.gz` and `{version}/`.
    pub output_dir: PathBuf,
    /// Pack version label.
    pub version: String,
    /// Only generate the pack for this region.
    pub region: Option<String>,
    /// Pause between hotspot requests.
    pub request_delay: Duration,
    /// Cluster sizing.
    pub cluster_params: ClusterParams,
}

/// Read-only data loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct PackContext {
    /// Species ID to eBird code.
    pub species_codes: BTreeMap<i64, String>,
    /// Region display names.
    pub region_names: RegionNames,
}

/// Result of a generation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateSummary {
    /// Index entries of the packs written, in definition order.
    pub generated: Vec<PackIndexEntry>,
    /// Regions skipped because they have no hotspots.
    pub skipped: Vec<String>,
    /// Regions that failed, with the error message.
    pub failed: Vec<(String, String)>,
    /// Index file, when at least one pack was written.
    pub index_path: Option<PathBuf>,
}

impl PackContext {
    /// Loads species codes from the database and region names from the
    /// name service. An unreachable name service leaves names empty.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Database`] if the species query fails.
    #[allow(clippy::future_not_send)]
    pub async fn load(client: &EbirdClient, conn: &Connection) -> Result<Self, PackError> {
        let species_codes = store::species_codes(conn)?;
        log::info!("Loaded {} species", species_codes.len());

        log::info!("Fetching region names...");
        let region_names = match client.fetch_region_names().await {
            Ok(names) => {
                log::info!("Loaded {} region names", names.len());
                RegionNames::new(names)
            }
            Err(e) => {
                log::warn!("Could not fetch region names, using codes: {e}");
                RegionNames::default()
            }
        };

        Ok(Self {
            species_codes,
            region_names,
        })
    }
}

/// Picks the definitions to generate.
///
/// # Errors
///
/// Returns [`PackError::UnknownRegion`] if `region` is set and not defined.
pub fn select_definitions<'a>(
    definitions: &'a [PackDefinition],
    region: Option<&str>,
) -> Result<Vec<&'a PackDefinition>, PackError> {
    match region {
        None => Ok(definitions.iter().collect()),
        Some(region) => definitions
            .iter()
            .find(|d| d.region == region)
            .map(|d| vec![d])
            .ok_or_else(|| PackError::UnknownRegion {
                region: region.to_string(),
                available: definitions.iter().map(|d| d.region.clone()).collect(),
            }),
    }
}

/// Generates one pack. Returns `None` when the region has no hotspots.
///
/// Stakeout hotspots and hotspots whose resolved region lies outside the
/// pack region are dropped before anything is counted.
///
/// # Errors
///
/// Returns [`PackError`] if the hotspot fetch, the database query, or
/// the write fails.
#[allow(clippy::future_not_send)]
pub async fn generate_pack(
    client: &EbirdClient,
    conn: &Connection,
    definition: &PackDefinition,
    context: &PackContext,
    options: &GenerateOptions,
) -> Result<Option<PackIndexEntry>, PackError> {
    let start = Instant::now();
    let fetched = client.fetch_hotspots(&definition.region).await?;
    let fetched_count = fetched.len();

    let hotspots: Vec<_> = fetched
        .into_iter()
        .filter(|h| !h.is_stakeout())
        .filter(|h| {
            let region = bird_targets_region::resolve(
                Some(h.country_code.as_str()),
                h.subnational1_code.as_deref(),
                h.subnational2_code.as_deref(),
            );
            bird_targets_region::region_matches(&region.region_code, &definition.region)
        })
        .collect();
    log::info!(
        "  Fetched {fetched_count} hotspots from eBird, kept {}",
        hotspots.len()
    );

    if hotspots.is_empty() {
        log::info!("  Skipping - no hotspots");
        return Ok(None);
    }

    let rows = store::month_obs_for_region(conn, &definition.region)?;
    log::info!("  Found {} month_obs rows in database", rows.len());
    let obs = MonthObsMap::from_rows(&rows);

    let pack = assemble_pack(
        &options.version,
        &hotspots,
        &obs,
        &context.region_names,
        &context.species_codes,
    );
    let written = write_pack(&options.output_dir, &definition.region, &pack)?;

    let points: Vec<GeoPoint> = hotspots.iter().map(bird_targets_models::HotspotRecord::point).collect();
    let clusters = generate_clusters(&points, definition.anchor(), &options.cluster_params);

    log::info!(
        "  Generated {} ({} KB uncompressed, {} KB compressed) in {:.1}s",
        written.relative_path,
        written.json_bytes / 1024,
        written.size / 1024,
        start.elapsed().as_secs_f64()
    );

    Ok(Some(PackIndexEntry {
        v: options.version.clone(),
        id: definition.id,
        region: definition.region.clone(),
        name: definition.name.clone(),
        hotspots: hotspots.len(),
        clusters,
        size: written.size,
        updated_at: timestamp_now(),
        path: written.relative_path,
    }))
}

/// Generates every selected pack, then the index.
///
/// A failing pack is logged and recorded; the run moves on to the next.
/// The index lists only packs written in this run and is not written
/// when none were.
///
/// # Errors
///
/// Returns [`PackError::UnknownRegion`] for an undefined `--region`, or an
/// error writing the index.
#[allow(clippy::future_not_send)]
pub async fn generate_all(
    client: &EbirdClient,
    conn: &Connection,
    definitions: &[PackDefinition],
    context: &PackContext,
    options: &GenerateOptions,
) -> Result<GenerateSummary, PackError> {
    let selected = select_definitions(definitions, options.region.as_deref())?;
    log::info!("Processing {} packs...", selected.len());

    let mut summary = GenerateSummary::default();

    for (i, definition) in selected.into_iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(options.request_delay).await;
        }
        log::info!("Generating pack for region: {}", definition.region);

        match generate_pack(client, conn, definition, context, options).await {
            Ok(Some(entry)) => summary.generated.push(entry),
            Ok(None) => summary.skipped.push(definition.region.clone()),
            Err(e) => {
                log::error!("Error processing pack {}: {e}", definition.region);
                summary.failed.push((definition.region.clone(), e.to_string()));
            }
        }
    }

    if !summary.generated.is_empty() {
        let index = PackIndex {
            packs: summary.generated.clone(),
        };
        let path = write_index(&options.output_dir, &index)?;
        log::info!(
            "Generated {} with {} packs",
            path.display(),
            summary.generated.len()
        );
        summary.index_path = Some(path);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: u32, region: &str) -> PackDefinition {
        PackDefinition {
            id,
            region: region.to_string(),
            center_lat: None,
            center_lng: None,
            name: region.to_string(),
        }
    }

    #[test]
    fn selects_all_or_one() {
        let defs = vec![def(1, "US-CA"), def(2, "CO")];
        assert_eq!(select_definitions(&defs, None).unwrap().len(), 2);

        let one = select_definitions(&defs, Some("CO")).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].id, 2);

        match select_definitions(&defs, Some("US-NY")) {
            Err(PackError::UnknownRegion { region, available }) => {
                assert_eq!(region, "US-NY");
                assert_eq!(available, vec!["US-CA", "CO"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn failing_packs_do_not_stop_the_run() {
        let dir = std::env::temp_dir().join(format!("bird_targets_generate_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        // no API key: every hotspot fetch fails
        let client = EbirdClient::new(None).unwrap();
        let conn = Connection::open_in_memory().unwrap();
        store::create_schema(&conn).unwrap();

        let options = GenerateOptions {
            output_dir: dir.clone(),
            version: "dec-2025".to_string(),
            region: None,
            request_delay: Duration::ZERO,
            cluster_params: ClusterParams::default(),
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let summary = runtime
            .block_on(generate_all(
                &client,
                &conn,
                &[def(1, "US-CA"), def(2, "CO")],
                &PackContext::default(),
                &options,
            ))
            .unwrap();

        assert!(summary.generated.is_empty());
        assert_eq!(summary.failed.len(), 2);
        assert_eq!(summary.index_path, None);
        assert!(!dir.join("packs.json.gz").exists());
    }
}
