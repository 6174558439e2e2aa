//! Pack export structures.
//!
//! A pack is a per-region bundle of hotspot metadata and per-location
//! monthly species arrays, written as gzipped JSON. The index file lists
//! every pack with its cluster centers so clients can pick one from a map
//! without downloading it.

use serde::ser::SerializeSeq as _;
use serde::{Deserialize, Serialize, Serializer};

use crate::{ClusterCenter, GeoPoint, MONTHS};

/// A region to build a pack for, as listed in `packs.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackDefinition {
    /// Stable numeric pack ID.
    pub id: u32,
    /// Region code prefix (e.g. `US-CA`).
    pub region: String,
    /// Optional anchor latitude for the first cluster center.
    #[serde(default)]
    pub center_lat: Option<f64>,
    /// Optional anchor longitude for the first cluster center.
    #[serde(default)]
    pub center_lng: Option<f64>,
    /// Display name.
    pub name: String,
}

impl PackDefinition {
    /// Returns the anchor coordinate when both components are set.
    #[must_use]
    pub fn anchor(&self) -> Option<GeoPoint> {
        match (self.center_lat, self.center_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        }
    }
}

/// Hotspot metadata embedded in a pack.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackHotspot {
    /// eBird locality ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Number of species with kept monthly statistics.
    pub species: usize,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Country code.
    pub country: String,
    /// State/province code.
    pub state: Option<String>,
    /// County code.
    pub county: Option<String>,
    /// Country display name (raw code when unknown).
    pub country_name: String,
    /// State display name.
    pub state_name: Option<String>,
    /// County display name.
    pub county_name: Option<String>,
}

/// Monthly observation counts for one species at one location.
///
/// Serialized as a flat array: `["amerob", jan, feb, ..., dec]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesMonths {
    /// eBird species code.
    pub code: String,
    /// Observation counts, January first; 0 where no statistic was kept.
    pub months: [u64; MONTHS],
}

impl Serialize for SpeciesMonths {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(MONTHS + 1))?;
        seq.serialize_element(&self.code)?;
        for count in &self.months {
            seq.serialize_element(count)?;
        }
        seq.end()
    }
}

/// Per-location frequency arrays in a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackTarget {
    /// eBird locality ID.
    pub id: String,
    /// Sample counts per month; `None` where the location had no kept row.
    pub samples: [Option<u64>; MONTHS],
    /// Species rows ordered by stable species ID.
    pub species: Vec<SpeciesMonths>,
}

/// Contents of one `{version}/{region}.json.gz` file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackData {
    /// Pack version label (e.g. `dec-2025`).
    pub v: String,
    /// Hotspots in the region.
    pub hotspots: Vec<PackHotspot>,
    /// Frequency arrays for locations with kept statistics.
    pub targets: Vec<PackTarget>,
}

/// One entry of `packs.json.gz`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackIndexEntry {
    /// Pack version label.
    pub v: String,
    /// Pack ID from the definition.
    pub id: u32,
    /// Region code prefix.
    pub region: String,
    /// Display name.
    pub name: String,
    /// Number of hotspots in the pack.
    pub hotspots: usize,
    /// Representative map coordinates.
    pub clusters: Vec<ClusterCenter>,
    /// Compressed file size in bytes.
    pub size: u64,
    /// ISO 8601 generation timestamp.
    pub updated_at: String,
    /// Path relative to the packs directory.
    pub path: String,
}

/// Contents of `packs.json.gz`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackIndex {
    /// All packs generated in this run.
    pub packs: Vec<PackIndexEntry>,
}
