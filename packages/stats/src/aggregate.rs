//! Deduplicated frequency aggregation.
//!
//! Two counts drive every statistic:
//!
//! * **samples** for `(location, month)`: distinct effective checklists
//! * **observations** for `(location, month, species)`: distinct effective
//!   checklists that reported the species
//!
//! Counts are collected into a [`GroupedCounts`] either by the DuckDB bulk
//! scan or by a [`FrequencyIndex`] fed event by event, and then turned into
//! scored rows by [`build_stats`].

use std::collections::{BTreeMap, HashMap, HashSet};

use bird_targets_models::{
    ChecklistEvent, DetectionEvent, EffectiveChecklistId, FrequencyStat, MONTHS, TimeBucket,
};
use chrono::{Datelike as _, NaiveDate};
use thiserror::Error;

use crate::score::{ScoreError, Scorer};

/// Errors from [`build_stats`].
#[derive(Debug, Error)]
pub enum AggregateError {
    /// An observation bucket has no matching sample bucket.
    #[error("No samples for location {location_id} in month {month}")]
    MissingSamples {
        /// Location of the orphaned observation row.
        location_id: String,
        /// Month of the orphaned observation row.
        month: u8,
    },

    /// Scoring failed.
    #[error(transparent)]
    Score(#[from] ScoreError),
}

/// Distinct-survey counts grouped by location, month and species.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedCounts {
    /// Samples per location, per month.
    pub samples: BTreeMap<String, BTreeMap<u8, u64>>,
    /// Observations per `(location, month, species)`.
    pub observations: BTreeMap<(String, u8, String), u64>,
}

impl GroupedCounts {
    /// Records the sample count for one `(location, month)` group.
    pub fn set_samples(&mut self, location_id: &str, month: u8, samples: u64) {
        self.samples
            .entry(location_id.to_string())
            .or_default()
            .insert(month, samples);
    }

    /// Records the observation count for one `(location, month, species)`
    /// group.
    pub fn set_observations(&mut self, location_id: &str, month: u8, species: &str, obs: u64) {
        self.observations
            .insert((location_id.to_string(), month, species.to_string()), obs);
    }

    /// Number of `(location, month)` sample groups.
    #[must_use]
    pub fn sample_groups(&self) -> usize {
        self.samples.values().map(BTreeMap::len).sum()
    }

    /// Whether nothing was counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.observations.is_empty()
    }
}

/// In-memory index from composite keys to distinct effective checklists.
///
/// Mutated only through [`Self::add_checklist`] and
/// [`Self::add_detection`], then consumed by [`Self::freeze`].
#[derive(Debug, Default)]
pub struct FrequencyIndex {
    samples: HashMap<(String, u8), HashSet<EffectiveChecklistId>>,
    observations: HashMap<(String, u8, String), HashSet<EffectiveChecklistId>>,
}

impl FrequencyIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a checklist towards its location's monthly samples.
    pub fn add_checklist(&mut self, event: &ChecklistEvent) {
        self.samples
            .entry((event.location_id.clone(), month_of(event.date)))
            .or_default()
            .insert(event.effective_checklist_id());
    }

    /// Counts a detection towards its species' monthly observations.
    pub fn add_detection(&mut self, event: &DetectionEvent) {
        self.observations
            .entry((
                event.location_id.clone(),
                month_of(event.date),
                event.species_key.clone(),
            ))
            .or_default()
            .insert(event.effective_checklist_id());
    }

    /// Freezes the index into plain counts.
    #[must_use]
    pub fn freeze(self) -> GroupedCounts {
        let mut counts = GroupedCounts::default();
        for ((location_id, month), ids) in self.samples {
            counts
                .samples
                .entry(location_id)
                .or_default()
                .insert(month, ids.len() as u64);
        }
        for (key, ids) in self.observations {
            counts.observations.insert(key, ids.len() as u64);
        }
        counts
    }
}

#[allow(clippy::cast_possible_truncation)]
fn month_of(date: NaiveDate) -> u8 {
    date.month() as u8
}

/// Scored monthly and yearly rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatTables {
    /// Monthly rows ordered by `(location, month, species)`.
    pub monthly: Vec<FrequencyStat>,
    /// Yearly rows ordered by `(location, species)`.
    pub yearly: Vec<FrequencyStat>,
}

impl StatTables {
    /// Monthly rows for one month, in order.
    pub fn month(&self, month: u8) -> impl Iterator<Item = &FrequencyStat> {
        self.monthly
            .iter()
            .filter(move |stat| stat.bucket == TimeBucket::Month(month))
    }

    /// Distinct locations with at least one kept row.
    #[must_use]
    pub fn location_count(&self) -> usize {
        self.monthly
            .iter()
            .chain(&self.yearly)
            .map(|stat| stat.location_id.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Turns grouped counts into scored rows.
///
/// Rows with a single observing survey are dropped. Yearly observations
/// are summed over every monthly group, including the dropped ones, and
/// yearly samples are the sum of the location's monthly samples.
///
/// # Errors
///
/// * [`AggregateError::MissingSamples`] if an observation group has no
///   sample group
/// * [`AggregateError::Score`] if a row cannot be scored
pub fn build_stats(counts: &GroupedCounts, scorer: &Scorer) -> Result<StatTables, AggregateError> {
    let mut tables = StatTables::default();
    let mut yearly_obs: BTreeMap<(&str, &str), u64> = BTreeMap::new();

    for ((location_id, month, species_key), &observations) in &counts.observations {
        let samples = counts
            .samples
            .get(location_id)
            .and_then(|months| months.get(month))
            .copied()
            .ok_or_else(|| AggregateError::MissingSamples {
                location_id: location_id.clone(),
                month: *month,
            })?;

        *yearly_obs
            .entry((location_id.as_str(), species_key.as_str()))
            .or_default() += observations;

        if observations <= 1 {
            continue;
        }

        tables.monthly.push(FrequencyStat {
            location_id: location_id.clone(),
            bucket: TimeBucket::Month(*month),
            species_key: species_key.clone(),
            observations,
            samples,
            score: scorer.score(observations, samples)?,
        });
    }

    for ((location_id, species_key), observations) in yearly_obs {
        if observations <= 1 {
            continue;
        }
        // present: every yearly key came from a month with samples
        let samples: u64 = counts
            .samples
            .get(location_id)
            .map(|months| months.values().sum())
            .unwrap_or_default();

        tables.yearly.push(FrequencyStat {
            location_id: location_id.to_string(),
            bucket: TimeBucket::Year,
            species_key: species_key.to_string(),
            observations,
            samples,
            score: scorer.score(observations, samples)?,
        });
    }

    log::debug!(
        "Built {} monthly and {} yearly rows from {} observation groups",
        tables.monthly.len(),
        tables.yearly.len(),
        counts.observations.len(),
    );

    Ok(tables)
}

/// Months 1 through 12.
pub fn months() -> impl Iterator<Item = u8> {
    (1..=MONTHS).filter_map(|m| u8::try_from(m).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checklist(location: &str, date: &str, id: &str, group: Option<&str>) -> ChecklistEvent {
        ChecklistEvent {
            location_id: location.to_string(),
            date: date.parse().unwrap(),
            checklist_id: id.to_string(),
            group_id: group.map(str::to_string),
            country_code: Some("US".to_string()),
            subnational1_code: None,
            subnational2_code: None,
            lat: 0.0,
            lng: 0.0,
        }
    }

    fn detection(
        location: &str,
        date: &str,
        species: &str,
        id: &str,
        group: Option<&str>,
    ) -> DetectionEvent {
        DetectionEvent {
            location_id: location.to_string(),
            date: date.parse().unwrap(),
            species_key: species.to_string(),
            checklist_id: id.to_string(),
            group_id: group.map(str::to_string),
        }
    }

    #[test]
    fn group_members_count_once() {
        let mut index = FrequencyIndex::new();
        index.add_checklist(&checklist("L1", "2024-05-01", "S1", Some("G1")));
        index.add_checklist(&checklist("L1", "2024-05-01", "S2", Some("G1")));
        index.add_checklist(&checklist("L1", "2024-05-03", "S3", None));
        index.add_detection(&detection("L1", "2024-05-01", "Turdus migratorius", "S1", Some("G1")));
        index.add_detection(&detection("L1", "2024-05-01", "Turdus migratorius", "S2", Some("G1")));

        let counts = index.freeze();
        assert_eq!(counts.samples["L1"][&5], 2);
        assert_eq!(
            counts.observations[&("L1".to_string(), 5, "Turdus migratorius".to_string())],
            1
        );
    }

    #[test]
    fn months_are_separate_buckets_across_years() {
        let mut index = FrequencyIndex::new();
        index.add_checklist(&checklist("L1", "2023-01-10", "S1", None));
        index.add_checklist(&checklist("L1", "2024-01-10", "S2", None));
        index.add_checklist(&checklist("L1", "2024-02-10", "S3", None));

        let counts = index.freeze();
        assert_eq!(counts.samples["L1"][&1], 2);
        assert_eq!(counts.samples["L1"][&2], 1);
        assert_eq!(counts.sample_groups(), 2);
    }

    #[test]
    fn single_observation_rows_are_dropped_but_feed_the_year() {
        let mut counts = GroupedCounts::default();
        counts.set_samples("L1", 1, 10);
        counts.set_samples("L1", 2, 10);
        counts.set_observations("L1", 1, "A", 1);
        counts.set_observations("L1", 2, "A", 1);
        counts.set_observations("L1", 2, "B", 3);

        let tables = build_stats(&counts, &Scorer::default()).unwrap();

        assert_eq!(tables.monthly.len(), 1);
        assert_eq!(tables.monthly[0].species_key, "B");
        assert_eq!(tables.monthly[0].bucket, TimeBucket::Month(2));

        assert_eq!(tables.yearly.len(), 2);
        let a = tables.yearly.iter().find(|s| s.species_key == "A").unwrap();
        assert_eq!(a.observations, 2);
        assert_eq!(a.samples, 20);
        assert_eq!(a.bucket, TimeBucket::Year);
    }

    #[test]
    fn yearly_samples_cover_months_without_the_species() {
        let mut counts = GroupedCounts::default();
        counts.set_samples("L1", 1, 4);
        counts.set_samples("L1", 7, 6);
        counts.set_observations("L1", 1, "A", 3);

        let tables = build_stats(&counts, &Scorer::default()).unwrap();
        assert_eq!(tables.yearly[0].samples, 10);
        assert_eq!(tables.yearly[0].observations, 3);
    }

    #[test]
    fn missing_sample_bucket_is_fatal() {
        let mut counts = GroupedCounts::default();
        counts.set_samples("L1", 1, 4);
        counts.set_observations("L1", 3, "A", 2);

        let err = build_stats(&counts, &Scorer::default()).unwrap_err();
        assert!(matches!(
            err,
            AggregateError::MissingSamples { ref location_id, month: 3 } if location_id == "L1"
        ));
    }

    #[test]
    fn every_kept_row_respects_bounds() {
        let mut index = FrequencyIndex::new();
        for (i, day) in ["01", "02", "03", "04"].iter().enumerate() {
            let id = format!("S{i}");
            index.add_checklist(&checklist("L1", &format!("2024-06-{day}"), &id, None));
            index.add_detection(&detection("L1", &format!("2024-06-{day}"), "A", &id, None));
            if i % 2 == 0 {
                index.add_detection(&detection("L1", &format!("2024-06-{day}"), "B", &id, None));
            }
        }

        let tables = build_stats(&index.freeze(), &Scorer::default()).unwrap();
        assert_eq!(tables.monthly.len(), 2);
        for stat in tables.monthly.iter().chain(&tables.yearly) {
            assert!(stat.observations > 1);
            assert!(stat.observations <= stat.samples);
            assert!((0.0..1.0).contains(&stat.score));
        }
        assert_eq!(tables.month(6).count(), 2);
        assert_eq!(tables.month(7).count(), 0);
        assert_eq!(tables.location_count(), 1);
    }

    #[test]
    fn empty_input_yields_no_rows() {
        let tables = build_stats(&GroupedCounts::default(), &Scorer::default()).unwrap();
        assert!(tables.monthly.is_empty());
        assert!(tables.yearly.is_empty());
    }

    #[test]
    fn rows_are_ordered() {
        let mut counts = GroupedCounts::default();
        counts.set_samples("L2", 1, 9);
        counts.set_samples("L1", 2, 9);
        counts.set_samples("L1", 1, 9);
        counts.set_observations("L2", 1, "A", 2);
        counts.set_observations("L1", 2, "A", 2);
        counts.set_observations("L1", 1, "B", 2);
        counts.set_observations("L1", 1, "A", 2);

        let tables = build_stats(&counts, &Scorer::default()).unwrap();
        let keys: Vec<_> = tables
            .monthly
            .iter()
            .map(|s| (s.location_id.as_str(), s.bucket, s.species_key.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("L1", TimeBucket::Month(1), "A"),
                ("L1", TimeBucket::Month(1), "B"),
                ("L1", TimeBucket::Month(2), "A"),
                ("L2", TimeBucket::Month(1), "A"),
            ]
        );
    }

    #[test]
    fn months_iterates_calendar() {
        assert_eq!(months().collect::<Vec<_>>(), (1..=12).collect::<Vec<u8>>());
    }
}
