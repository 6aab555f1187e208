//! Volatility-targeted position sizing.
//!
//! Each candidate position receives the same dollar risk budget; the share
//! count is whatever makes the position's daily dollar-volatility (shares
//! times ATR) land at that budget. Risk parity across names, not fixed
//! notional.

use serde::{Deserialize, Serialize};

use crate::data::DataError;

/// Position sizing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizerConfig {
    /// Fraction of current equity allocated as total risk budget per
    /// rebalance, split equally across selected names.
    pub risk_budget_pct: f64,
}

impl Default for PositionSizerConfig {
    fn default() -> Self {
        Self {
            risk_budget_pct: 0.02,
        }
    }
}

/// Converts a risk budget and per-share volatility into a share count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionSizer {
    config: PositionSizerConfig,
}

impl PositionSizer {
    pub fn new(config: PositionSizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PositionSizerConfig {
        &self.config
    }

    /// Share count whose dollar-volatility approximates `risk_budget`.
    ///
    /// Rounds down so the budget is never exceeded; returns zero when the
    /// budget does not cover a single share's risk contribution.
    pub fn size(
        &self,
        risk_budget: f64,
        atr_dollars_per_share: f64,
        price: f64,
    ) -> Result<u64, DataError> {
        if atr_dollars_per_share <= 0.0 || !atr_dollars_per_share.is_finite() {
            return Err(DataError::NonPositiveVolatility(atr_dollars_per_share));
        }
        if price <= 0.0 || !price.is_finite() {
            return Err(DataError::NonPositivePrice(price));
        }
        if risk_budget <= 0.0 {
            return Ok(0);
        }

        Ok((risk_budget / atr_dollars_per_share).floor() as u64)
    }

    /// Per-name risk budget for a rebalance: equal split of the equity
    /// fraction across `names` candidates.
    pub fn budget_per_name(&self, equity: f64, names: usize) -> f64 {
        if names == 0 {
            return 0.0;
        }
        equity * self.config.risk_budget_pct / names as f64
    }
}
