//! Pack and index file assembly.

use std::collections::{BTreeMap, HashMap};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use bird_targets_models::HotspotRecord;
use bird_targets_models::pack::{
    PackData, PackDefinition, PackHotspot, PackIndex, PackTarget, SpeciesMonths,
};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;

use crate::PackError;
use crate::obs_map::MonthObsMap;

/// Index file name inside the packs directory.
pub const INDEX_FILE_NAME: &str = "packs.json.gz";

/// Display names keyed by region code.
///
/// Empty when the name service was unreachable; lookups then fall back as
/// described on each method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionNames {
    names: HashMap<String, String>,
}

impl RegionNames {
    /// Wraps a code-to-name map.
    #[must_use]
    pub const fn new(names: HashMap<String, String>) -> Self {
        Self { names }
    }

    /// Country name, or the code itself when unknown.
    #[must_use]
    pub fn country(&self, code: &str) -> String {
        self.names
            .get(code)
            .cloned()
            .unwrap_or_else(|| code.to_string())
    }

    /// State or county name; `None` when the code is absent or unknown.
    #[must_use]
    pub fn subregion(&self, code: Option<&str>) -> Option<String> {
        code.and_then(|c| self.names.get(c)).cloned()
    }

    /// Number of known names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no names are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Hotspot entries for a pack, in input order.
#[must_use]
pub fn build_pack_hotspots(
    hotspots: &[HotspotRecord],
    obs: &MonthObsMap,
    names: &RegionNames,
) -> Vec<PackHotspot> {
    hotspots
        .iter()
        .map(|h| {
            let state = bird_targets_region::clean_subnational1(h.subnational1_code.as_deref())
                .map(str::to_string);
            let county = h
                .subnational2_code
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string);

            PackHotspot {
                id: h.id.clone(),
                name: h.name.clone(),
                species: obs.species_count(&h.id),
                lat: h.lat,
                lng: h.lng,
                country: h.country_code.clone(),
                country_name: names.country(&h.country_code),
                state_name: names.subregion(state.as_deref()),
                county_name: names.subregion(county.as_deref()),
                state,
                county,
            }
        })
        .collect()
}

/// Frequency arrays for every location in `obs`.
///
/// Species without a known code are left out.
#[must_use]
pub fn build_pack_targets(obs: &MonthObsMap, species_codes: &BTreeMap<i64, String>) -> Vec<PackTarget> {
    obs.iter()
        .map(|(location_id, location)| PackTarget {
            id: location_id.to_string(),
            samples: location.samples,
            species: location
                .species
                .iter()
                .filter_map(|(species_id, months)| {
                    species_codes.get(species_id).map(|code| SpeciesMonths {
                        code: code.clone(),
                        months: *months,
                    })
                })
                .collect(),
        })
        .collect()
}

/// Builds the full contents of one pack file.
#[must_use]
pub fn assemble_pack(
    version: &str,
    hotspots: &[HotspotRecord],
    obs: &MonthObsMap,
    names: &RegionNames,
    species_codes: &BTreeMap<i64, String>,
) -> PackData {
    PackData {
        v: version.to_string(),
        hotspots: build_pack_hotspots(hotspots, obs, names),
        targets: build_pack_targets(obs, species_codes),
    }
}

/// A pack file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPack {
    /// Absolute path.
    pub path: PathBuf,
    /// Path relative to the packs directory (`dec-2025/US-CA.json.gz`).
    pub relative_path: String,
    /// Uncompressed JSON size in bytes.
    pub json_bytes: u64,
    /// Compressed file size in bytes.
    pub size: u64,
}

/// Serializes `value` as compact JSON and gzips it to `path`.
///
/// Returns the uncompressed and compressed sizes.
fn write_gz_json<T: Serialize>(path: &Path, value: &T) -> Result<(u64, u64), PackError> {
    let json = serde_json::to_vec(value)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PackError::io(parent, e))?;
    }
    let file = std::fs::File::create(path).map_err(|e| PackError::io(path, e))?;
    let mut encoder = GzEncoder::new(file, Compression::best());
    encoder.write_all(&json).map_err(|e| PackError::io(path, e))?;
    encoder.finish().map_err(|e| PackError::io(path, e))?;

    let size = std::fs::metadata(path)
        .map_err(|e| PackError::io(path, e))?
        .len();
    Ok((json.len() as u64, size))
}

/// Writes `{out_dir}/{version}/{region}.json.gz`.
///
/// # Errors
///
/// Returns [`PackError`] if serialization or writing fails.
pub fn write_pack(out_dir: &Path, region: &str, pack: &PackData) -> Result<WrittenPack, PackError> {
    let relative_path = format!("{}/{region}.json.gz", pack.v);
    let path = out_dir.join(&pack.v).join(format!("{region}.json.gz"));
    let (json_bytes, size) = write_gz_json(&path, pack)?;

    Ok(WrittenPack {
        path,
        relative_path,
        json_bytes,
        size,
    })
}

/// Writes `{out_dir}/packs.json.gz`.
///
/// # Errors
///
/// Returns [`PackError`] if serialization or writing fails.
pub fn write_index(out_dir: &Path, index: &PackIndex) -> Result<PathBuf, PackError> {
    let path = out_dir.join(INDEX_FILE_NAME);
    write_gz_json(&path, index)?;
    Ok(path)
}

/// Loads pack definitions from a JSON array file.
///
/// # Errors
///
/// Returns [`PackError::Definitions`] if the file cannot be read or
/// parsed.
pub fn load_definitions(path: &Path) -> Result<Vec<PackDefinition>, PackError> {
    let text = std::fs::read_to_string(path).map_err(|e| PackError::Definitions {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| PackError::Definitions {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// UTC timestamp in ISO 8601 with a trailing `Z`.
#[must_use]
pub fn timestamp_now() -> String {
    chrono::Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6fZ")
        .to_string()
}
