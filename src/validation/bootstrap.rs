//! Bootstrap significance testing.
//!
//! Estimates the probability that an observed performance edge arose by
//! chance: resample the net return series with replacement, recompute the
//! Sharpe-like statistic per resample, and report the fraction of
//! resampled statistics at or below zero (null hypothesis: the true edge
//! is non-positive).
//!
//! Randomness is always caller-seeded. Candidates evaluated in parallel
//! derive their own sub-seed from a base seed and candidate index, so the
//! p-value for a given input never depends on scheduling order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Bootstrap parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Number of resamples per candidate.
    pub resample_count: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            resample_count: 1_000,
        }
    }
}

/// Seeded bootstrap hypothesis test over a return series.
#[derive(Debug, Clone, Default)]
pub struct BootstrapValidator {
    config: BootstrapConfig,
}

impl BootstrapValidator {
    pub fn new(config: BootstrapConfig) -> Self {
        Self { config }
    }

    /// Derive the sub-seed for candidate `index` from a base seed.
    ///
    /// SplitMix64 finalizer: a functional mapping, so the seed depends
    /// only on (base, index) and never on evaluation order.
    pub fn derive_seed(base_seed: u64, index: u64) -> u64 {
        let mut z = base_seed
            .wrapping_add(index.wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Bootstrap p-value for the observed return series.
    ///
    /// Returns 1.0 for series too short to resample (no evidence of edge).
    /// A zero-variance resample counts as non-positive, which is the
    /// conservative direction for the gate.
    pub fn validate(&self, returns: &[f64], seed: u64) -> f64 {
        if returns.len() < 2 || self.config.resample_count == 0 {
            return 1.0;
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let n = returns.len();
        let mut non_positive = 0usize;
        let mut resample = vec![0.0; n];

        for _ in 0..self.config.resample_count {
            for slot in resample.iter_mut() {
                *slot = returns[rng.gen_range(0..n)];
            }
            if resampled_statistic(&resample) <= 0.0 {
                non_positive += 1;
            }
        }

        non_positive as f64 / self.config.resample_count as f64
    }
}

/// Mean/stdev statistic for one resample; zero when variance vanishes.
fn resampled_statistic(returns: &[f64]) -> f64 {
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return 0.0;
    }
    mean / std_dev
}
