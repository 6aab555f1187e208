//! Durable calibration artifact.
//!
//! The end product of a run: the selected weight vector with its
//! validation metrics, or the explicit absence of one. Written once,
//! atomically (temp file + rename), and never merged — later runs
//! supersede earlier artifacts wholesale. An unvalidated Phase-1 result
//! refuses to replace a validated Phase-2 artifact unless forced.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::data::WeightVector;

use super::config::Phase;

/// Artifact format version.
pub const ARTIFACT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "Refusing to overwrite validated artifact at {path} with an unvalidated result; \
         pass force to override"
    )]
    WouldOverwriteValidated { path: String },
}

/// Metrics attached to a selected weight vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionMetrics {
    /// Bootstrap p-value (absent for Phase 1, which runs no gate).
    pub p_value: Option<f64>,
    /// Stability fraction across walk-forward windows (absent for Phase 1).
    pub stability: Option<f64>,
    /// Cost-adjusted annualized Sharpe-like ratio.
    pub net_sharpe: f64,
    /// Maximum drawdown as a fraction of peak equity.
    pub max_drawdown: f64,
    /// Compound annual growth rate.
    pub growth_rate: f64,
}

/// Terminal outcome of a calibration run.
#[derive(Debug, Clone)]
pub enum CalibrationOutcome {
    /// Exactly one winner with its metrics.
    Selected {
        weights: WeightVector,
        metrics: SelectionMetrics,
        /// True only when the Phase-2 gate was applied and passed.
        validated: bool,
        /// True when a candidate or time budget cut the search short.
        partial: bool,
        candidates_evaluated: usize,
    },
    /// Zero candidates cleared the gate. A valid, informative result —
    /// distinct from any error.
    NoSignificantAlpha {
        candidates_evaluated: usize,
        partial: bool,
    },
}

impl CalibrationOutcome {
    pub fn is_selection(&self) -> bool {
        matches!(self, CalibrationOutcome::Selected { .. })
    }
}

/// The persisted calibration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub universe: String,
    pub phase: Phase,
    pub seed: u64,
    /// Selected weights; `None` records a no-significant-alpha run.
    pub weights: Option<WeightVector>,
    pub metrics: Option<SelectionMetrics>,
    /// Whether the significance/stability gate was applied and passed.
    pub validated: bool,
    /// Whether the search was cut short by a budget.
    pub partial: bool,
    pub candidates_evaluated: usize,
}

impl CalibrationResult {
    /// Assemble the record for an outcome.
    pub fn from_outcome(
        outcome: &CalibrationOutcome,
        universe: &str,
        phase: Phase,
        seed: u64,
    ) -> Self {
        match outcome {
            CalibrationOutcome::Selected {
                weights,
                metrics,
                validated,
                partial,
                candidates_evaluated,
            } => Self {
                version: ARTIFACT_VERSION,
                generated_at: Utc::now(),
                universe: universe.to_string(),
                phase,
                seed,
                weights: Some(weights.clone()),
                metrics: Some(metrics.clone()),
                validated: *validated,
                partial: *partial,
                candidates_evaluated: *candidates_evaluated,
            },
            CalibrationOutcome::NoSignificantAlpha {
                candidates_evaluated,
                partial,
            } => Self {
                version: ARTIFACT_VERSION,
                generated_at: Utc::now(),
                universe: universe.to_string(),
                phase,
                seed,
                weights: None,
                metrics: None,
                validated: false,
                partial: *partial,
                candidates_evaluated: *candidates_evaluated,
            },
        }
    }

    /// Load an existing artifact.
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Atomically persist the artifact.
    ///
    /// Writes to a sibling temp file and renames over the target, so a
    /// crashed run never leaves a half-written record. Only a selection
    /// replaces a previous artifact; an unvalidated result will not
    /// displace a validated one unless `force` is set.
    pub fn save(&self, path: &Path, force: bool) -> Result<(), ArtifactError> {
        if self.weights.is_none() {
            // No selection: the previous artifact stays authoritative.
            return Ok(());
        }

        if !force && !self.validated {
            if let Ok(existing) = Self::load(path) {
                if existing.validated {
                    return Err(ArtifactError::WouldOverwriteValidated {
                        path: path.display().to_string(),
                    });
                }
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &json)?;
        fs::rename(&tmp_path, path)?;

        info!("Wrote calibration artifact to {}", path.display());
        Ok(())
    }
}
