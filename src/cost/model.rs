//! Transaction cost and capacity model.
//!
//! Cost per order = commission + market impact:
//!
//! ```text
//! impact = C * (order_dollars / adv_20)^alpha * (atr / price)
//! ```
//!
//! The impact term is convex in participation (alpha < 1 flattens, alpha > 1
//! steepens) and scales with the symbol's own volatility. Orders above 1% of
//! ADV additionally trip a capacity flag; the flag is advisory and feeds
//! back into selection only through the modeled cost.

use serde::{Deserialize, Serialize};

use crate::data::DataError;

/// Configurable cost model parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModelConfig {
    /// Commission as a fraction of traded notional.
    pub commission_rate: f64,
    /// Market-impact calibration constant (50 bps default).
    pub impact_constant: f64,
    /// Market-impact exponent; controls convexity in participation.
    pub impact_exponent: f64,
    /// Participation (order / ADV) above which capacity is flagged.
    pub capacity_limit: f64,
}

impl Default for CostModelConfig {
    fn default() -> Self {
        Self {
            commission_rate: 0.0005,
            impact_constant: 0.005,
            impact_exponent: 0.75,
            capacity_limit: 0.01,
        }
    }
}

/// Estimated cost for a single order.
#[derive(Debug, Clone, Copy)]
pub struct CostEstimate {
    /// Total expected cost in dollars.
    pub cost: f64,
    /// Commission component.
    pub commission: f64,
    /// Market-impact component.
    pub impact: f64,
    /// Participation as a fraction of ADV.
    pub participation: f64,
    /// Order exceeded the capacity limit (advisory).
    pub capacity_breach: bool,
}

/// Expected-cost model for order execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostModel {
    config: CostModelConfig,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            config: CostModelConfig::default(),
        }
    }
}

impl CostModel {
    pub fn new(config: CostModelConfig) -> Self {
        Self { config }
    }

    /// Zero-cost model for the pure-ranking (cost-free) scenario.
    pub fn zero() -> Self {
        Self {
            config: CostModelConfig {
                commission_rate: 0.0,
                impact_constant: 0.0,
                impact_exponent: 1.0,
                capacity_limit: f64::INFINITY,
            },
        }
    }

    pub fn config(&self) -> &CostModelConfig {
        &self.config
    }

    /// Expected dollar cost for trading `order_dollars` of a symbol with
    /// the given liquidity and volatility.
    ///
    /// ADV must be strictly positive: cost against a dead symbol is
    /// undefined, not zero.
    pub fn cost(
        &self,
        order_dollars: f64,
        adv_20: f64,
        atr: f64,
        price: f64,
    ) -> Result<CostEstimate, DataError> {
        if adv_20 <= 0.0 || !adv_20.is_finite() {
            return Err(DataError::NonPositiveAdv(adv_20));
        }
        if price <= 0.0 || !price.is_finite() {
            return Err(DataError::NonPositivePrice(price));
        }

        let order = order_dollars.abs();
        let participation = order / adv_20;
        let atr_fraction = atr / price;

        let commission = self.config.commission_rate * order;
        let impact = if order > 0.0 {
            self.config.impact_constant
                * participation.powf(self.config.impact_exponent)
                * atr_fraction
                * order
        } else {
            0.0
        };

        Ok(CostEstimate {
            cost: commission + impact,
            commission,
            impact,
            participation,
            capacity_breach: participation > self.config.capacity_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CostModelConfig::default();
        assert_eq!(config.impact_exponent, 0.75);
        assert_eq!(config.capacity_limit, 0.01);
    }

    #[test]
    fn test_cost_monotonic_in_order_size() {
        let model = CostModel::default();
        let mut prev = 0.0;
        for order in [1_000.0, 10_000.0, 100_000.0, 1_000_000.0] {
            let est = model.cost(order, 5_000_000.0, 2.0, 100.0).unwrap();
            assert!(est.cost >= prev);
            prev = est.cost;
        }
    }

    #[test]
    fn test_capacity_flag_at_one_percent_adv() {
        let model = CostModel::default();

        let small = model.cost(40_000.0, 5_000_000.0, 2.0, 100.0).unwrap();
        assert!(!small.capacity_breach);

        let large = model.cost(60_000.0, 5_000_000.0, 2.0, 100.0).unwrap();
        assert!(large.capacity_breach);
    }

    #[test]
    fn test_capacity_trips_earlier_after_liquidity_drop() {
        // QA-04: when ADV drops 90%, the same flag trips at a 10x smaller
        // order and the impact term grows for any fixed order.
        let model = CostModel::default();

        let order = 60_000.0;
        let before = model.cost(order, 5_000_000.0, 2.0, 100.0).unwrap();
        let after = model.cost(order, 500_000.0, 2.0, 100.0).unwrap();

        assert!(after.impact > before.impact);
        assert!(after.capacity_breach);

        let smaller = model.cost(6_000.0, 500_000.0, 2.0, 100.0).unwrap();
        assert!(smaller.capacity_breach);
    }

    #[test]
    fn test_non_positive_adv_is_data_error() {
        let model = CostModel::default();
        assert!(matches!(
            model.cost(10_000.0, 0.0, 2.0, 100.0),
            Err(DataError::NonPositiveAdv(_))
        ));
        assert!(matches!(
            model.cost(10_000.0, -1.0, 2.0, 100.0),
            Err(DataError::NonPositiveAdv(_))
        ));
    }

    #[test]
    fn test_zero_model_charges_nothing() {
        let model = CostModel::zero();
        let est = model.cost(1_000_000.0, 50_000.0, 5.0, 20.0).unwrap();
        assert_eq!(est.cost, 0.0);
        assert!(!est.capacity_breach);
    }

    #[test]
    fn test_zero_order_costs_nothing() {
        let model = CostModel::default();
        let est = model.cost(0.0, 5_000_000.0, 2.0, 100.0).unwrap();
        assert_eq!(est.cost, 0.0);
    }
}
