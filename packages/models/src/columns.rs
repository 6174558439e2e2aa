//! Column names of the raw eBird Basic Dataset files.
//!
//! The release files are tab-separated with a header row. Only the columns
//! listed here survive projection; everything downstream refers to them by
//! these constants.

pub const LOCALITY_ID: &str = "LOCALITY ID";
pub const LOCALITY: &str = "LOCALITY";
pub const LOCALITY_TYPE: &str = "LOCALITY TYPE";
pub const LATITUDE: &str = "LATITUDE";
pub const LONGITUDE: &str = "LONGITUDE";
pub const OBSERVATION_DATE: &str = "OBSERVATION DATE";
pub const SAMPLING_EVENT_IDENTIFIER: &str = "SAMPLING EVENT IDENTIFIER";
pub const GROUP_IDENTIFIER: &str = "GROUP IDENTIFIER";
pub const ALL_SPECIES_REPORTED: &str = "ALL SPECIES REPORTED";
pub const CATEGORY: &str = "CATEGORY";
pub const SCIENTIFIC_NAME: &str = "SCIENTIFIC NAME";
pub const COUNTRY_CODE: &str = "COUNTRY CODE";
pub const STATE_CODE: &str = "STATE CODE";
pub const COUNTY_CODE: &str = "COUNTY CODE";

/// `LOCALITY TYPE` value for eBird hotspots.
pub const HOTSPOT_LOCALITY_TYPE: &str = "H";

/// Columns kept when projecting the species file.
pub const SPECIES_COLUMNS: &[&str] = &[
    LOCALITY_ID,
    LOCALITY,
    LOCALITY_TYPE,
    LATITUDE,
    LONGITUDE,
    OBSERVATION_DATE,
    SAMPLING_EVENT_IDENTIFIER,
    ALL_SPECIES_REPORTED,
    GROUP_IDENTIFIER,
    CATEGORY,
    SCIENTIFIC_NAME,
];

/// Columns kept when projecting the sampling file.
pub const SAMPLING_COLUMNS: &[&str] = &[
    LOCALITY_ID,
    LOCALITY,
    OBSERVATION_DATE,
    SAMPLING_EVENT_IDENTIFIER,
    GROUP_IDENTIFIER,
    COUNTRY_CODE,
    STATE_CODE,
    COUNTY_CODE,
    LATITUDE,
    LONGITUDE,
];

/// Columns the aggregation reads from a projected species file.
pub const DETECTION_REQUIRED: &[&str] = &[
    LOCALITY_ID,
    OBSERVATION_DATE,
    SAMPLING_EVENT_IDENTIFIER,
    GROUP_IDENTIFIER,
    SCIENTIFIC_NAME,
];

/// Columns the aggregation reads from a projected sampling file.
pub const CHECKLIST_REQUIRED: &[&str] = &[
    LOCALITY_ID,
    OBSERVATION_DATE,
    SAMPLING_EVENT_IDENTIFIER,
    GROUP_IDENTIFIER,
    COUNTRY_CODE,
    STATE_CODE,
    COUNTY_CODE,
    LATITUDE,
    LONGITUDE,
];

/// Returns the entries of `required` missing from `header`.
#[must_use]
pub fn missing_columns<'a, S: AsRef<str>>(header: &[S], required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|col| !header.iter().any(|h| h.as_ref() == *col))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projections_cover_required_columns() {
        assert!(missing_columns(SPECIES_COLUMNS, DETECTION_REQUIRED).is_empty());
        assert!(missing_columns(SAMPLING_COLUMNS, CHECKLIST_REQUIRED).is_empty());
    }

    #[test]
    fn reports_missing_columns_in_order() {
        let header = vec!["LOCALITY ID".to_string(), "GROUP IDENTIFIER".to_string()];
        assert_eq!(
            missing_columns(&header, DETECTION_REQUIRED),
            vec![OBSERVATION_DATE, SAMPLING_EVENT_IDENTIFIER, SCIENTIFIC_NAME]
        );
    }
}
