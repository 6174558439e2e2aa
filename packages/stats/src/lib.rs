#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Frequency statistics for eBird locations.
//!
//! Counts how many distinct surveys at a location reported each species,
//! per calendar month and for the whole year, and ranks the results with
//! the lower bound of the Wilson score interval so that a species seen on
//! 3 of 4 checklists does not outrank one seen on 300 of 500.

pub mod aggregate;
pub mod score;

pub use aggregate::{AggregateError, FrequencyIndex, GroupedCounts, StatTables, build_stats};
pub use score::{DEFAULT_WILSON_Z, ScoreError, Scorer};
