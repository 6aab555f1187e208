//! Factor-matrix input layer.
//!
//! The calibrator consumes a pre-computed factor matrix (one row per
//! symbol/date with rank-normalized scores and cost-model fields) and
//! validates it on load. Factor computation itself lives upstream.

pub mod loader;
pub mod types;

pub use loader::{FactorMatrixLoader, EXPECTED_COLUMNS};
pub use types::{
    DataError, Factor, FactorMatrix, FactorRow, WeightError, WeightVector, FACTOR_COUNT,
    WEIGHT_SUM_TOLERANCE,
};
