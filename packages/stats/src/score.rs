//! Wilson score lower bound.

use thiserror::Error;

/// z for a 95% confidence interval.
pub const DEFAULT_WILSON_Z: f64 = 1.96;

/// Errors from [`Scorer::new`] and [`Scorer::score`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoreError {
    /// z must be finite and positive.
    #[error("Wilson z must be a finite number greater than 0, got {z}")]
    InvalidZ {
        /// Rejected value.
        z: f64,
    },

    /// A row reached scoring without any samples.
    #[error("Cannot score a row with zero samples")]
    ZeroSamples,

    /// More observing surveys than surveys.
    #[error("Observations ({observations}) exceed samples ({samples})")]
    ObservationsExceedSamples {
        /// Distinct observing surveys.
        observations: u64,
        /// Distinct surveys.
        samples: u64,
    },
}

/// Computes Wilson lower bounds for a fixed z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scorer {
    z: f64,
    z_squared: f64,
    half_z_squared: f64,
    quarter_z_squared: f64,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::with_valid_z(DEFAULT_WILSON_Z)
    }
}

impl Scorer {
    /// Creates a scorer for the given z.
    ///
    /// # Errors
    ///
    /// Returns [`ScoreError::InvalidZ`] unless `z` is finite and above 0.
    /// At z = 0 a species on every survey would score exactly 1.
    pub fn new(z: f64) -> Result<Self, ScoreError> {
        if z.is_finite() && z > 0.0 {
            Ok(Self::with_valid_z(z))
        } else {
            Err(ScoreError::InvalidZ { z })
        }
    }

    fn with_valid_z(z: f64) -> Self {
        let z_squared = z * z;
        Self {
            z,
            z_squared,
            half_z_squared: z_squared / 2.0,
            quarter_z_squared: z_squared / 4.0,
        }
    }

    /// The z this scorer was built with.
    #[must_use]
    pub const fn z(&self) -> f64 {
        self.z
    }

    /// Scores `k` observing surveys out of `n`.
    ///
    /// `(k + z²/2 − z·sqrt(k(n−k)/n + z²/4)) / (n + z²)`
    ///
    /// # Errors
    ///
    /// * [`ScoreError::ZeroSamples`] if `n` is 0
    /// * [`ScoreError::ObservationsExceedSamples`] if `k > n`
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self, k: u64, n: u64) -> Result<f64, ScoreError> {
        if n == 0 {
            return Err(ScoreError::ZeroSamples);
        }
        if k > n {
            return Err(ScoreError::ObservationsExceedSamples {
                observations: k,
                samples: n,
            });
        }

        let k = k as f64;
        let n = n as f64;
        let spread = (k * (n - k) / n + self.quarter_z_squared).sqrt();
        let score = (k + self.half_z_squared - self.z * spread) / (n + self.z_squared);

        // k = 0 lands on zero up to rounding
        Ok(score.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_samples_is_an_error() {
        assert_eq!(Scorer::default().score(0, 0), Err(ScoreError::ZeroSamples));
    }

    #[test]
    fn observations_above_samples_is_an_error() {
        assert!(matches!(
            Scorer::default().score(5, 4),
            Err(ScoreError::ObservationsExceedSamples {
                observations: 5,
                samples: 4
            })
        ));
    }

    #[test]
    fn known_value() {
        // 5 of 10 at 95%: 0.2366
        let score = Scorer::default().score(5, 10).unwrap();
        assert!((score - 0.2366).abs() < 1e-4, "got {score}");
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let scorer = Scorer::default();
        for n in 1..60 {
            for k in 0..=n {
                let score = scorer.score(k, n).unwrap();
                assert!((0.0..1.0).contains(&score), "k={k} n={n} score={score}");
            }
        }
    }

    #[test]
    fn strictly_increasing_in_observations() {
        let scorer = Scorer::default();
        for n in [2_u64, 7, 50, 1_000] {
            let mut previous = -1.0;
            for k in 0..=n {
                let score = scorer.score(k, n).unwrap();
                assert!(score > previous, "k={k} n={n}");
                previous = score;
            }
        }
    }

    #[test]
    fn more_evidence_ranks_higher_at_same_rate() {
        let scorer = Scorer::default();
        assert!(scorer.score(300, 400).unwrap() > scorer.score(3, 4).unwrap());
    }

    #[test]
    fn larger_z_is_more_conservative() {
        let loose = Scorer::new(1.0).unwrap().score(8, 10).unwrap();
        let strict = Scorer::new(2.58).unwrap().score(8, 10).unwrap();
        assert!(strict < loose);
    }

    #[test]
    fn degenerate_z_is_rejected() {
        for z in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(
                matches!(Scorer::new(z), Err(ScoreError::InvalidZ { .. })),
                "z={z} was accepted"
            );
        }
        assert_eq!(Scorer::new(DEFAULT_WILSON_Z).unwrap(), Scorer::default());
    }

    #[test]
    fn every_survey_observing_stays_below_one() {
        for z in [0.01, 0.5, DEFAULT_WILSON_Z] {
            let scorer = Scorer::new(z).unwrap();
            for n in [1_u64, 5, 1_000] {
                let score = scorer.score(n, n).unwrap();
                assert!(score < 1.0, "z={z} n={n} score={score}");
            }
        }
    }
}
