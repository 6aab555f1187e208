//! Risk management module.
//!
//! Provides:
//! - Volatility-targeted position sizing (equal risk budget per name)
//! - Regime scenario calendar (externally supplied entry-halt dates)

pub mod position_sizer;
pub mod regime;

pub use position_sizer::{PositionSizer, PositionSizerConfig};
pub use regime::RegimeCalendar;
