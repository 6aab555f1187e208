//! Time-window stability check.
//!
//! An edge that exists only in one stretch of history is not an edge.
//! The stability fraction is the share of walk-forward windows whose net
//! return is strictly positive; a candidate must clear the configured
//! threshold in addition to bootstrap significance.

use serde::{Deserialize, Serialize};

/// Stability parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Minimum fraction of positive windows required to pass.
    pub threshold: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self { threshold: 0.65 }
    }
}

/// Positive-window fraction over walk-forward results.
#[derive(Debug, Clone, Default)]
pub struct StabilityChecker {
    config: StabilityConfig,
}

impl StabilityChecker {
    pub fn new(config: StabilityConfig) -> Self {
        Self { config }
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Fraction of windows with strictly positive net return.
    pub fn stability(&self, window_returns: &[f64]) -> f64 {
        if window_returns.is_empty() {
            return 0.0;
        }
        let positive = window_returns.iter().filter(|r| **r > 0.0).count();
        positive as f64 / window_returns.len() as f64
    }

    /// Whether a stability fraction clears the configured threshold.
    pub fn passes(&self, fraction: f64) -> bool {
        fraction >= self.config.threshold
    }
}
