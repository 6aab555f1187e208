pub mod backtest;
pub mod calibrate;
pub mod cost;
pub mod data;
pub mod risk;
pub mod validation;
pub mod walkforward;

// Re-export commonly used types
pub use backtest::{BacktestConfig, BacktestEngine, SegmentResult};
pub use calibrate::{
    run_calibration, CalibrationConfig, CalibrationError, CalibrationOutcome, CalibrationResult,
    Phase, Phase1Calibrator, Phase2Calibrator,
};
pub use cost::{CostEstimate, CostModel, CostModelConfig};
pub use data::{DataError, Factor, FactorMatrix, FactorMatrixLoader, FactorRow, WeightVector};
pub use risk::{PositionSizer, RegimeCalendar};
pub use validation::{BootstrapValidator, StabilityChecker};
pub use walkforward::{WalkForwardConfig, WalkForwardSegment, WalkForwardSplitter};
