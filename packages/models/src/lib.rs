#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Shared types for the bird targets toolchain.
//!
//! Defines the raw event records streamed out of the eBird Basic Dataset,
//! the frequency statistics produced by aggregation, resolved region codes,
//! cluster centers, and the pack export structures. Every other crate in
//! the workspace speaks in terms of these types.

pub mod columns;
pub mod pack;
pub mod progress;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Number of monthly buckets in a year.
pub const MONTHS: usize = 12;

/// A latitude/longitude pair in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl GeoPoint {
    /// Creates a new point.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Deduplication key for one real-world survey.
///
/// Shared (group) checklists carry a group identifier; every member
/// checklist of the group collapses onto it so the survey is counted once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EffectiveChecklistId(String);

impl EffectiveChecklistId {
    /// Uses `group_id` when present and non-empty, else `checklist_id`.
    #[must_use]
    pub fn from_parts(checklist_id: &str, group_id: Option<&str>) -> Self {
        match group_id.map(str::trim) {
            Some(group) if !group.is_empty() => Self(group.to_string()),
            _ => Self(checklist_id.to_string()),
        }
    }

    /// Returns the underlying identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EffectiveChecklistId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One species report on one checklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionEvent {
    /// eBird locality ID (e.g. `L123456`).
    pub location_id: String,
    /// Observation date.
    pub date: NaiveDate,
    /// Stable species key (the scientific name in the raw dataset).
    pub species_key: String,
    /// Sampling event identifier (e.g. `S98765`).
    pub checklist_id: String,
    /// Group identifier for shared checklists.
    pub group_id: Option<String>,
}

impl DetectionEvent {
    /// Returns the deduplication key for this event.
    #[must_use]
    pub fn effective_checklist_id(&self) -> EffectiveChecklistId {
        EffectiveChecklistId::from_parts(&self.checklist_id, self.group_id.as_deref())
    }
}

/// One completed, fully-reported survey.
#[derive(Debug, Clone, PartialEq)]
pub struct ChecklistEvent {
    /// eBird locality ID.
    pub location_id: String,
    /// Observation date.
    pub date: NaiveDate,
    /// Sampling event identifier.
    pub checklist_id: String,
    /// Group identifier for shared checklists.
    pub group_id: Option<String>,
    /// Country code (e.g. `US`).
    pub country_code: Option<String>,
    /// State/province code (e.g. `US-CA`).
    pub subnational1_code: Option<String>,
    /// County code (e.g. `US-CA-085`).
    pub subnational2_code: Option<String>,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl ChecklistEvent {
    /// Returns the deduplication key for this event.
    #[must_use]
    pub fn effective_checklist_id(&self) -> EffectiveChecklistId {
        EffectiveChecklistId::from_parts(&self.checklist_id, self.group_id.as_deref())
    }
}

/// Time bucket a frequency statistic is aggregated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeBucket {
    /// Calendar month, 1-12.
    Month(u8),
    /// All months combined.
    Year,
}

impl TimeBucket {
    /// Returns the month number for monthly buckets.
    #[must_use]
    pub const fn month(self) -> Option<u8> {
        match self {
            Self::Month(m) => Some(m),
            Self::Year => None,
        }
    }
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Month(m) => write!(f, "{m}"),
            Self::Year => f.write_str("year"),
        }
    }
}

/// A scored per-location, per-bucket, per-species frequency row.
///
/// Only rows with `1 < observations <= samples` exist; `score` is the
/// Wilson lower bound and lies in `[0, 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyStat {
    /// eBird locality ID.
    pub location_id: String,
    /// Month or whole year.
    pub bucket: TimeBucket,
    /// Stable species key.
    pub species_key: String,
    /// Distinct surveys that reported the species.
    pub observations: u64,
    /// Distinct surveys at the location in the bucket.
    pub samples: u64,
    /// Confidence-adjusted ranking score.
    pub score: f64,
}

/// Resolved administrative region for a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCode {
    /// Country code (e.g. `US`).
    pub country_code: String,
    /// Cleaned state/province code; `None` when missing or malformed.
    pub subnational1_code: Option<String>,
    /// County code, when known.
    pub subnational2_code: Option<String>,
    /// Most specific valid code, used for prefix matching.
    pub region_code: String,
}

/// A representative map coordinate for a region.
///
/// Serialized as a compact `[lat, lng]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 2]", from = "[f64; 2]")]
pub struct ClusterCenter {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl From<ClusterCenter> for [f64; 2] {
    fn from(value: ClusterCenter) -> Self {
        [value.lat, value.lng]
    }
}

impl From<[f64; 2]> for ClusterCenter {
    fn from([lat, lng]: [f64; 2]) -> Self {
        Self { lat, lng }
    }
}

/// A place record from the reference-data service (an eBird hotspot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotRecord {
    /// eBird locality ID.
    #[serde(rename = "locId")]
    pub id: String,
    /// Display name.
    #[serde(rename = "locName", default)]
    pub name: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Country code.
    #[serde(default)]
    pub country_code: String,
    /// State/province code as reported upstream (may be malformed).
    #[serde(default)]
    pub subnational1_code: Option<String>,
    /// County code as reported upstream.
    #[serde(default)]
    pub subnational2_code: Option<String>,
    /// Species recorded at the hotspot, all time.
    #[serde(rename = "numSpeciesAllTime", default)]
    pub num_species: Option<u64>,
    /// Checklists submitted at the hotspot, all time.
    #[serde(rename = "numChecklistsAllTime", default)]
    pub num_checklists: Option<u64>,
}

impl HotspotRecord {
    /// Returns the hotspot coordinate.
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    /// Whether the hotspot is a temporary "stakeout" location.
    #[must_use]
    pub fn is_stakeout(&self) -> bool {
        self.name.trim().to_lowercase().starts_with("stakeout")
    }
}

/// A taxonomy entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesRecord {
    /// Stable numeric ID assigned in taxonomic order.
    pub id: i64,
    /// Scientific name, used to join raw detections.
    pub sci_name: String,
    /// Common name.
    pub name: String,
    /// eBird species code (e.g. `amerob`).
    pub code: String,
    /// Taxonomic sort order.
    pub taxon_order: f64,
}

/// The two raw eBird releases consumed by the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum DatasetKind {
    /// Species observations (one row per detection).
    Species,
    /// Sampling events (one row per checklist).
    Sampling,
}

impl DatasetKind {
    /// All dataset kinds in processing order.
    pub const ALL: &[Self] = &[Self::Species, Self::Sampling];
}
