//! Calibration orchestration.
//!
//! Two calibration paths over the same backtest/validation machinery:
//! - Phase 1: fixed-catalog proof of concept, no significance gate
//! - Phase 2: coarse scan + Dirichlet refinement behind a mandatory
//!   significance-and-stability gate
//!
//! Runs terminate with exactly one of: a selection, an explicit
//! no-significant-alpha outcome, or an error.

pub mod artifact;
pub mod config;
pub mod phase1;
pub mod phase2;

use thiserror::Error;

use crate::data::{DataError, FactorMatrix};
use crate::risk::RegimeCalendar;
use crate::walkforward::SplitError;

pub use artifact::{
    ArtifactError, CalibrationOutcome, CalibrationResult, SelectionMetrics, ARTIFACT_VERSION,
};
pub use config::{CalibrationConfig, ConfigError, Phase};
pub use phase1::Phase1Calibrator;
pub use phase2::{CandidateEvaluation, Phase2Calibrator, ValidationOutcome};

/// Run-level calibration failures.
///
/// `NoSignificantAlpha` is deliberately *not* here — an empty gate is a
/// valid outcome, not an error.
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Walk-forward split error: {0}")]
    Split(#[from] SplitError),

    #[error("Dirichlet sampler rejected concentration parameters: {0}")]
    Sampler(String),
}

/// Run the configured phase against a loaded factor matrix.
pub fn run_calibration(
    config: CalibrationConfig,
    matrix: &FactorMatrix,
    regime: Option<RegimeCalendar>,
) -> Result<CalibrationOutcome, CalibrationError> {
    match config.phase {
        Phase::Phase1 => {
            let mut calibrator = Phase1Calibrator::new(config);
            if let Some(regime) = regime {
                calibrator = calibrator.with_regime(regime);
            }
            calibrator.run(matrix)
        }
        Phase::Phase2 => {
            let mut calibrator = Phase2Calibrator::new(config);
            if let Some(regime) = regime {
                calibrator = calibrator.with_regime(regime);
            }
            calibrator.run(matrix)
        }
    }
}
