#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Region code resolution for eBird locations.
//!
//! eBird places every location in a country / state (subnational1) /
//! county (subnational2) hierarchy, but the raw codes are sparse and
//! occasionally malformed: some state codes arrive as `"CO-"` with the
//! suffix missing. This crate collapses the three raw fields into a
//! single canonical region code using a strict fallback chain:
//!
//! 1. county code, if non-empty
//! 2. state code, if it has a non-empty suffix after the first `-`
//! 3. country code
//!
//! Pack assembly then selects locations by prefix on that code, so a pack
//! for `US` picks up `US-CA-085`.

use std::collections::BTreeMap;

use bird_targets_models::{ChecklistEvent, GeoPoint, RegionCode};

/// Returns `true` when a state code has a non-empty suffix after the
/// first `-` (`"US-CA"` is valid, `"CO-"` and `"CO"` are not).
#[must_use]
pub fn is_valid_subnational1(code: &str) -> bool {
    code.split_once('-')
        .is_some_and(|(_, suffix)| !suffix.trim().is_empty())
}

/// Returns the state code when it is present and valid.
#[must_use]
pub fn clean_subnational1(code: Option<&str>) -> Option<&str> {
    non_empty(code).filter(|c| is_valid_subnational1(c))
}

/// Resolves raw codes into a [`RegionCode`].
///
/// Empty and whitespace-only strings are treated as absent.
#[must_use]
pub fn resolve(
    country_code: Option<&str>,
    subnational1_code: Option<&str>,
    subnational2_code: Option<&str>,
) -> RegionCode {
    let country = non_empty(country_code).unwrap_or_default();
    let sub1 = clean_subnational1(subnational1_code);
    let sub2 = non_empty(subnational2_code);

    if let Some(raw) = non_empty(subnational1_code)
        && sub1.is_none()
    {
        log::trace!("Discarding malformed subnational1 code {raw:?}");
    }

    let region_code = sub2.or(sub1).unwrap_or(country);

    RegionCode {
        country_code: country.to_string(),
        subnational1_code: sub1.map(str::to_string),
        subnational2_code: sub2.map(str::to_string),
        region_code: region_code.to_string(),
    }
}

/// Whether `region_code` falls inside the pack region `target`.
#[must_use]
pub fn region_matches(region_code: &str, target: &str) -> bool {
    region_code.starts_with(target)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Keeps the lexicographically greatest non-empty value.
///
/// Conflicting non-empty values are settled by string order, not arrival
/// order, so the result does not depend on how the input was sorted.
fn widen(slot: &mut Option<String>, candidate: Option<&str>) {
    let Some(candidate) = non_empty(candidate) else {
        return;
    };
    match slot {
        Some(current) if current.as_str() >= candidate => {}
        _ => *slot = Some(candidate.to_string()),
    }
}

/// Raw fields accumulated for one location.
#[derive(Debug, Clone, Default, PartialEq)]
struct RawFields {
    country_code: Option<String>,
    subnational1_code: Option<String>,
    subnational2_code: Option<String>,
    point: Option<GeoPoint>,
}

/// A location with its resolved region and coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    /// Resolved region hierarchy.
    pub region: RegionCode,
    /// Largest latitude and largest longitude seen for the location.
    pub point: Option<GeoPoint>,
}

/// Per-location accumulator over raw checklist rows.
///
/// Each field keeps its widest non-null value (MAX over strings) because
/// individual rows often leave some of the three codes blank. The
/// coordinate takes MAX per axis, so the result does not depend on row
/// order.
#[derive(Debug, Default)]
pub struct LocationRegions {
    locations: BTreeMap<String, RawFields>,
}

impl LocationRegions {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one checklist event into its location's fields.
    pub fn observe(&mut self, event: &ChecklistEvent) {
        self.observe_fields(
            &event.location_id,
            event.country_code.as_deref(),
            event.subnational1_code.as_deref(),
            event.subnational2_code.as_deref(),
            Some(GeoPoint::new(event.lat, event.lng)),
        );
    }

    /// Folds raw field values into a location's fields.
    pub fn observe_fields(
        &mut self,
        location_id: &str,
        country_code: Option<&str>,
        subnational1_code: Option<&str>,
        subnational2_code: Option<&str>,
        point: Option<GeoPoint>,
    ) {
        let fields = self.locations.entry(location_id.to_string()).or_default();
        widen(&mut fields.country_code, country_code);
        widen(&mut fields.subnational1_code, subnational1_code);
        widen(&mut fields.subnational2_code, subnational2_code);
        if let Some(p) = point {
            fields.point = Some(fields.point.map_or(p, |cur| {
                GeoPoint::new(cur.lat.max(p.lat), cur.lng.max(p.lng))
            }));
        }
    }

    /// Number of distinct locations seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether no location has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Consumes the accumulator and resolves every location, ordered by
    /// location ID.
    #[must_use]
    pub fn resolve(self) -> BTreeMap<String, ResolvedLocation> {
        self.locations
            .into_iter()
            .map(|(location_id, fields)| {
                let region = resolve(
                    fields.country_code.as_deref(),
                    fields.subnational1_code.as_deref(),
                    fields.subnational2_code.as_deref(),
                );
                (
                    location_id,
                    ResolvedLocation {
                        region,
                        point: fields.point,
                    },
                )
            })
            .collect()
    }
}
