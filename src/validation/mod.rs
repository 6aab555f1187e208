//! Statistical validation module.
//!
//! Provides the two halves of the significance gate:
//! - Bootstrap hypothesis test (seeded, order-independent)
//! - Time-window stability check

pub mod bootstrap;
pub mod stability;

pub use bootstrap::{BootstrapConfig, BootstrapValidator};
pub use stability::{StabilityChecker, StabilityConfig};
