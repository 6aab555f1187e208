//! Run configuration.
//!
//! A calibration run is fully described by one [`CalibrationConfig`];
//! every stochastic operation takes its seed from here and every
//! threshold is explicit. The config is validated up front so a bad
//! parameter fails the run before any data is touched.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::BacktestConfig;
use crate::validation::{BootstrapConfig, StabilityConfig};
use crate::walkforward::WalkForwardConfig;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        message: message.into(),
    }
}

/// Which calibration path to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Fixed-catalog proof of concept; output is unvalidated.
    Phase1,
    /// Full search with the significance/stability gate.
    Phase2,
}

/// Complete parameterization of one calibration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Calibration path.
    pub phase: Phase,

    /// Lookback range (inclusive).
    pub start: NaiveDate,
    pub end: NaiveDate,

    /// Universe identifier, recorded in the artifact.
    pub universe: String,

    /// Base seed; all candidate sub-seeds derive from it.
    pub seed: u64,

    /// Number of Dirichlet draws in Phase 2 stage B.
    pub dirichlet_draws: usize,

    /// Strength of the Dirichlet bias toward the coarse-scan optimum.
    /// Zero keeps the draw uniform over the simplex.
    pub concentration: f64,

    /// Bootstrap p-value must be strictly below this to pass the gate.
    pub significance_threshold: f64,

    /// Stability gate parameters.
    #[serde(default)]
    pub stability: StabilityConfig,

    /// Bootstrap resampling parameters.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Walk-forward geometry.
    #[serde(default)]
    pub walkforward: WalkForwardConfig,

    /// Backtest parameters (shared by both phases).
    #[serde(default)]
    pub backtest: BacktestConfig,

    /// Maximum drawdown ceiling for Phase 1 selection, as a fraction.
    pub max_drawdown_ceiling: f64,

    /// Stop launching candidates after this many evaluations.
    #[serde(default)]
    pub max_candidates: Option<usize>,

    /// Stop launching candidates after this wall-clock budget.
    #[serde(default)]
    pub time_budget_secs: Option<u64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            phase: Phase::Phase2,
            start: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or_default(),
            universe: "default".to_string(),
            seed: 42,
            dirichlet_draws: 2_000,
            concentration: 4.0,
            significance_threshold: 0.05,
            stability: StabilityConfig::default(),
            bootstrap: BootstrapConfig::default(),
            walkforward: WalkForwardConfig::default(),
            backtest: BacktestConfig::default(),
            max_drawdown_ceiling: 0.25,
            max_candidates: None,
            time_budget_secs: None,
        }
    }
}

impl CalibrationConfig {
    /// Validate every field before the run starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end <= self.start {
            return Err(invalid(
                "date range",
                format!("end {} must be after start {}", self.end, self.start),
            ));
        }
        if self.universe.is_empty() {
            return Err(invalid("universe", "must not be empty"));
        }
        if self.phase == Phase::Phase2 && self.dirichlet_draws == 0 {
            return Err(invalid("dirichlet_draws", "must be at least 1 for phase 2"));
        }
        if self.concentration < 0.0 || !self.concentration.is_finite() {
            return Err(invalid("concentration", "must be finite and non-negative"));
        }
        if !(0.0..1.0).contains(&self.significance_threshold)
            || self.significance_threshold <= 0.0
        {
            return Err(invalid(
                "significance_threshold",
                "must lie strictly inside (0, 1)",
            ));
        }
        if !(0.0..=1.0).contains(&self.stability.threshold) || self.stability.threshold <= 0.0 {
            return Err(invalid("stability.threshold", "must lie inside (0, 1]"));
        }
        if self.bootstrap.resample_count == 0 {
            return Err(invalid("bootstrap.resample_count", "must be at least 1"));
        }
        if self.backtest.top_k == 0 {
            return Err(invalid("backtest.top_k", "must be at least 1"));
        }
        if self.backtest.sizer.risk_budget_pct <= 0.0 {
            return Err(invalid("sizer.risk_budget_pct", "must be positive"));
        }
        if self.max_drawdown_ceiling <= 0.0 {
            return Err(invalid("max_drawdown_ceiling", "must be positive"));
        }
        if self.max_candidates == Some(0) {
            return Err(invalid("max_candidates", "must be at least 1 when set"));
        }
        Ok(())
    }
}
