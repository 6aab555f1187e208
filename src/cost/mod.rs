//! Transaction cost modeling.
//!
//! Commission plus nonlinear market impact, with an advisory capacity
//! flag based on order participation in average daily volume.

pub mod model;

pub use model::{CostEstimate, CostModel, CostModelConfig};
