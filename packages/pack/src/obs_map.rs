//! Per-location monthly arrays rebuilt from `month_obs` rows.

use std::collections::BTreeMap;

use bird_targets_database::store::MonthObsRow;
use bird_targets_models::MONTHS;

/// Monthly samples and per-species observations for one location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationObs {
    /// Surveys per month; `None` where the location has no kept row.
    pub samples: [Option<u64>; MONTHS],
    /// Observing surveys per month, keyed by species ID.
    pub species: BTreeMap<i64, [u64; MONTHS]>,
}

/// `month_obs` rows regrouped by location.
///
/// Locations and species are kept in ID order so serialized packs are
/// byte-stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthObsMap {
    locations: BTreeMap<String, LocationObs>,
}

impl MonthObsMap {
    /// Groups rows by location. Rows with a month outside 1-12 are
    /// ignored.
    #[must_use]
    pub fn from_rows(rows: &[MonthObsRow]) -> Self {
        let mut locations: BTreeMap<String, LocationObs> = BTreeMap::new();

        for row in rows {
            let Some(slot) = month_slot(row.month) else {
                log::warn!(
                    "Ignoring month {} for location {}",
                    row.month,
                    row.location_id
                );
                continue;
            };

            let location = locations.entry(row.location_id.clone()).or_default();
            // samples are per (location, month); every species row repeats them
            location.samples[slot].get_or_insert(row.samples);
            location.species.entry(row.species_id).or_default()[slot] = row.obs;
        }

        Self { locations }
    }

    /// Data for one location.
    #[must_use]
    pub fn get(&self, location_id: &str) -> Option<&LocationObs> {
        self.locations.get(location_id)
    }

    /// Number of species with at least one kept month at the location.
    #[must_use]
    pub fn species_count(&self, location_id: &str) -> usize {
        self.get(location_id).map_or(0, |l| l.species.len())
    }

    /// All locations in ID order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LocationObs)> {
        self.locations.iter().map(|(id, obs)| (id.as_str(), obs))
    }

    /// Number of locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether no location has rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

fn month_slot(month: u8) -> Option<usize> {
    (1..=MONTHS).contains(&usize::from(month)).then(|| usize::from(month) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(location: &str, month: u8, species: i64, obs: u64, samples: u64) -> MonthObsRow {
        MonthObsRow {
            location_id: location.to_string(),
            month,
            species_id: species,
            obs,
            samples,
        }
    }

    #[test]
    fn groups_by_location_and_month() {
        let map = MonthObsMap::from_rows(&[
            row("L1", 1, 20, 3, 10),
            row("L1", 1, 10, 2, 10),
            row("L1", 12, 10, 4, 8),
            row("L2", 6, 10, 2, 2),
        ]);

        assert_eq!(map.len(), 2);
        let l1 = map.get("L1").unwrap();
        assert_eq!(l1.samples[0], Some(10));
        assert_eq!(l1.samples[11], Some(8));
        assert_eq!(l1.samples[5], None);

        let ids: Vec<i64> = l1.species.keys().copied().collect();
        assert_eq!(ids, vec![10, 20]);
        assert_eq!(l1.species[&10][0], 2);
        assert_eq!(l1.species[&10][11], 4);
        assert_eq!(l1.species[&10][6], 0);
        assert_eq!(map.species_count("L1"), 2);
        assert_eq!(map.species_count("missing"), 0);
    }

    #[test]
    fn out_of_range_months_are_ignored() {
        let map = MonthObsMap::from_rows(&[row("L1", 0, 1, 2, 3), row("L1", 13, 1, 2, 3)]);
        assert!(map.is_empty());
    }

    #[test]
    fn species_rows_are_never_all_zero() {
        let map = MonthObsMap::from_rows(&[row("L1", 3, 1, 2, 5), row("L1", 4, 2, 7, 9)]);
        for (_, location) in map.iter() {
            for months in location.species.values() {
                assert!(months.iter().any(|&m| m > 0));
            }
        }
    }
}
