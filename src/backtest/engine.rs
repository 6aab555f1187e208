//! Core backtesting engine.
//!
//! Simulates periodic rebalancing of a top-K composite-score portfolio
//! over one date interval:
//! 1. Score the cross-section with the candidate weight vector
//! 2. Select the top-K symbols (lexicographic symbol tie-break)
//! 3. Size each position against its volatility budget
//! 4. Price the turnover through the cost model
//! 5. Accrue net P&L into the equity curve
//!
//! The engine holds configuration only — every pass builds its own local
//! state, so one engine can be shared by reference across parallel
//! candidate evaluations against the same read-only factor matrix.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cost::{CostModel, CostModelConfig};
use crate::data::{DataError, FactorMatrix, FactorRow, WeightVector};
use crate::risk::{PositionSizer, PositionSizerConfig, RegimeCalendar};
use crate::walkforward::DateInterval;

/// Trading days per year, used to annualize ratio statistics.
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Configuration for backtest execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Starting equity.
    pub initial_equity: Decimal,

    /// Number of top-scored symbols held each rebalance.
    pub top_k: usize,

    /// Position sizing parameters.
    #[serde(default)]
    pub sizer: PositionSizerConfig,

    /// Cost model parameters.
    #[serde(default)]
    pub cost: CostModelConfig,

    /// Disable to run in pure-ranking mode (no transaction costs).
    #[serde(default = "default_true")]
    pub use_cost_model: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_equity: Decimal::from(100_000),
            top_k: 10,
            sizer: PositionSizerConfig::default(),
            cost: CostModelConfig::default(),
            use_cost_model: true,
        }
    }
}

/// A live position within a single backtest pass.
///
/// Ephemeral: created at a rebalance, marked to market each period,
/// dropped when the pass ends.
#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: String,
    /// Signed share count (top-K selection holds longs only).
    pub shares: i64,
    pub entry_price: f64,
    /// Most recent mark price.
    pub last_price: f64,
    /// Entry cost applied to this position.
    pub cost: f64,
}

impl Position {
    pub fn notional(&self) -> f64 {
        self.shares as f64 * self.last_price
    }
}

/// Daily equity snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: Decimal,
    pub daily_pnl: Decimal,
    pub open_positions: usize,
}

/// Performance record for one (weight vector, interval) backtest pass.
#[derive(Debug, Clone)]
pub struct SegmentResult {
    /// Interval simulated.
    pub interval: DateInterval,

    /// Ordered net period returns (fractions, one per rebalance period).
    pub period_returns: Vec<f64>,

    /// Annualized net Sharpe-like ratio; `None` when the return series has
    /// zero variance (the DegenerateSeries condition — undefined, not zero).
    pub net_sharpe: Option<f64>,

    /// Compound annual growth rate of net equity, as a fraction.
    pub growth_rate: f64,

    /// Total compound net return over the interval, as a fraction.
    pub total_return: f64,

    /// Maximum peak-to-trough drawdown as a fraction of the peak.
    pub max_drawdown: f64,

    /// Fraction of periods with strictly positive net return.
    pub hit_rate: f64,

    /// Number of orders that tripped the capacity flag (advisory).
    pub capacity_breaches: usize,

    /// Total modeled transaction cost.
    pub total_cost: Decimal,

    /// Daily equity curve.
    pub equity_curve: Vec<EquityPoint>,
}

impl SegmentResult {
    /// Zero-variance return series: the ratio is undefined and the
    /// candidate is excluded from the significance gate.
    pub fn is_degenerate(&self) -> bool {
        self.net_sharpe.is_none()
    }
}

/// Annualized mean/stdev ratio of a return series.
///
/// Returns `None` for series shorter than two periods or with zero
/// variance — the ratio is undefined there, never zero.
pub fn sharpe_ratio(returns: &[f64]) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return None;
    }
    Some(mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt())
}

/// The backtesting engine.
pub struct BacktestEngine {
    config: BacktestConfig,
    cost_model: CostModel,
    sizer: PositionSizer,
    regime: Option<RegimeCalendar>,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        let cost_model = if config.use_cost_model {
            CostModel::new(config.cost.clone())
        } else {
            CostModel::zero()
        };
        let sizer = PositionSizer::new(config.sizer.clone());
        Self {
            config,
            cost_model,
            sizer,
            regime: None,
        }
    }

    /// Apply a regime scenario: dates flagged unsafe carry existing
    /// positions forward without opening new ones.
    pub fn with_regime(mut self, regime: RegimeCalendar) -> Self {
        self.regime = Some(regime);
        self
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run one backtest pass over `interval`.
    ///
    /// Pure computation over the read-only matrix: no I/O, no state kept
    /// between calls.
    pub fn run(
        &self,
        weights: &WeightVector,
        matrix: &FactorMatrix,
        interval: DateInterval,
    ) -> Result<SegmentResult, DataError> {
        let dates = matrix.dates_in(interval.start, interval.end);
        if dates.len() < 2 {
            return Err(DataError::EmptyInterval {
                start: interval.start,
                end: interval.end,
            });
        }

        let initial_equity: f64 = self.config.initial_equity.try_into().unwrap_or(1.0);
        let mut equity = initial_equity;
        let mut holdings: BTreeMap<String, Position> = BTreeMap::new();

        let mut period_returns = Vec::with_capacity(dates.len() - 1);
        let mut equity_curve = Vec::with_capacity(dates.len());
        let mut peak = equity;
        let mut max_drawdown = 0.0_f64;
        let mut capacity_breaches = 0usize;
        let mut total_cost = 0.0_f64;

        equity_curve.push(EquityPoint {
            date: dates[0],
            equity: self.config.initial_equity,
            daily_pnl: Decimal::ZERO,
            open_positions: 0,
        });

        for window in dates.windows(2) {
            let (today, next) = (window[0], window[1]);
            let section = matrix.cross_section(today);

            // 1-3. Build the target book for today.
            let safe_to_open = self
                .regime
                .as_ref()
                .map_or(true, |r| r.safe_to_open(today));

            let targets = if safe_to_open {
                self.target_book(weights, section, equity)?
            } else {
                // Entry halt: carry existing holdings, open nothing new.
                holdings
                    .values()
                    .map(|p| (p.symbol.clone(), p.shares))
                    .collect()
            };

            // 4. Price the turnover.
            let mut costs_today = 0.0;
            let mut cost_by_symbol: BTreeMap<String, f64> = BTreeMap::new();
            if self.config.use_cost_model {
                for (symbol, target_shares) in &targets {
                    let held = holdings.get(symbol).map_or(0, |p| p.shares);
                    let delta = target_shares - held;
                    if delta == 0 {
                        continue;
                    }
                    if let Some(row) = lookup(section, symbol) {
                        let order_dollars = delta.unsigned_abs() as f64 * row.close;
                        let estimate = self.cost_model.cost(
                            order_dollars,
                            row.adv_20,
                            row.atr_14,
                            row.close,
                        )?;
                        costs_today += estimate.cost;
                        cost_by_symbol.insert(symbol.clone(), estimate.cost);
                        if estimate.capacity_breach {
                            capacity_breaches += 1;
                        }
                    }
                }
                // Exits of names leaving the book are orders too.
                for (symbol, position) in &holdings {
                    if targets.contains_key(symbol) {
                        continue;
                    }
                    if let Some(row) = lookup(section, symbol) {
                        let order_dollars = position.shares.unsigned_abs() as f64 * row.close;
                        let estimate = self.cost_model.cost(
                            order_dollars,
                            row.adv_20,
                            row.atr_14,
                            row.close,
                        )?;
                        costs_today += estimate.cost;
                        if estimate.capacity_breach {
                            capacity_breaches += 1;
                        }
                    }
                }
            }

            // Rebuild the book at today's closes.
            let mut new_holdings = BTreeMap::new();
            for (symbol, shares) in targets {
                if shares == 0 {
                    continue;
                }
                let price = lookup(section, &symbol)
                    .map(|r| r.close)
                    .or_else(|| holdings.get(&symbol).map(|p| p.last_price));
                if let Some(price) = price {
                    let applied_cost = cost_by_symbol.get(&symbol).copied().unwrap_or(0.0);
                    new_holdings.insert(
                        symbol.clone(),
                        Position {
                            symbol,
                            shares,
                            entry_price: price,
                            last_price: price,
                            cost: applied_cost,
                        },
                    );
                }
            }
            holdings = new_holdings;

            // 5. Mark to next close; positions whose symbol vanishes are
            // liquidated flat at the last mark (delistings never add P&L).
            let next_section = matrix.cross_section(next);
            let mut gross_pnl = 0.0;
            holdings.retain(|symbol, position| {
                if let Some(row) = lookup(next_section, symbol) {
                    gross_pnl += position.shares as f64 * (row.close - position.last_price);
                    position.last_price = row.close;
                    true
                } else {
                    false
                }
            });

            let net_pnl = gross_pnl - costs_today;
            let period_return = if equity > 0.0 { net_pnl / equity } else { 0.0 };
            equity += net_pnl;
            total_cost += costs_today;
            period_returns.push(period_return);

            if equity > peak {
                peak = equity;
            }
            if peak > 0.0 {
                let drawdown = (peak - equity) / peak;
                if drawdown > max_drawdown {
                    max_drawdown = drawdown;
                }
            }

            equity_curve.push(EquityPoint {
                date: next,
                equity: Decimal::from_f64_retain(equity).unwrap_or_default(),
                daily_pnl: Decimal::from_f64_retain(net_pnl).unwrap_or_default(),
                open_positions: holdings.len(),
            });
        }

        let total_return = if initial_equity > 0.0 {
            equity / initial_equity - 1.0
        } else {
            0.0
        };
        let years = period_returns.len() as f64 / TRADING_DAYS_PER_YEAR;
        let growth_rate = if years > 0.0 && initial_equity > 0.0 && equity > 0.0 {
            (equity / initial_equity).powf(1.0 / years) - 1.0
        } else {
            0.0
        };
        let winners = period_returns.iter().filter(|r| **r > 0.0).count();
        let hit_rate = if period_returns.is_empty() {
            0.0
        } else {
            winners as f64 / period_returns.len() as f64
        };

        Ok(SegmentResult {
            interval,
            net_sharpe: sharpe_ratio(&period_returns),
            period_returns,
            growth_rate,
            total_return,
            max_drawdown,
            hit_rate,
            capacity_breaches,
            total_cost: Decimal::from_f64_retain(total_cost).unwrap_or_default(),
            equity_curve,
        })
    }

    /// Select the top-K composite scores and size each name.
    fn target_book(
        &self,
        weights: &WeightVector,
        section: &[FactorRow],
        equity: f64,
    ) -> Result<BTreeMap<String, i64>, DataError> {
        let mut scored: Vec<(&FactorRow, f64)> = section
            .iter()
            .map(|row| (row, weights.composite(row)))
            .collect();

        // Descending score; ties resolved lexicographically by symbol so
        // selection is reproducible.
        scored.sort_by(|(a, sa), (b, sb)| {
            sb.total_cmp(sa)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        scored.truncate(self.config.top_k);

        let budget = self.sizer.budget_per_name(equity, scored.len());
        let mut book = BTreeMap::new();
        for (row, _) in scored {
            let shares = self.sizer.size(budget, row.atr_14, row.close)?;
            if shares > 0 {
                book.insert(row.symbol.clone(), shares as i64);
            }
        }
        Ok(book)
    }
}

/// Binary search within one date's sorted cross-section.
fn lookup<'a>(section: &'a [FactorRow], symbol: &str) -> Option<&'a FactorRow> {
    section
        .binary_search_by(|r| r.symbol.as_str().cmp(symbol))
        .ok()
        .map(|i| &section[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FACTOR_COUNT;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(symbol: &str, date: NaiveDate, score: f64, close: f64, adv: f64) -> FactorRow {
        FactorRow {
            symbol: symbol.to_string(),
            date,
            scores: [score; FACTOR_COUNT],
            adv_20: adv,
            atr_14: close * 0.02,
            close,
        }
    }

    /// Two symbols, one trending up, one flat, over `n` days.
    fn trending_matrix(n: usize) -> FactorMatrix {
        let start = date(2020, 1, 1);
        let mut rows = Vec::new();
        let mut up = 100.0;
        for i in 0..n {
            let d = start + chrono::Duration::days(i as i64);
            rows.push(row("UP", d, 0.8, up, 5_000_000.0));
            rows.push(row("FLAT", d, -0.5, 50.0, 5_000_000.0));
            up *= 1.002;
        }
        FactorMatrix::from_rows(rows).unwrap()
    }

    fn full_span(matrix: &FactorMatrix) -> DateInterval {
        let (start, end) = matrix.date_span();
        DateInterval::new(start, end)
    }

    #[test]
    fn test_default_config() {
        let config = BacktestConfig::default();
        assert_eq!(config.initial_equity, dec!(100_000));
        assert_eq!(config.top_k, 10);
        assert!(config.use_cost_model);
    }

    #[test]
    fn test_engine_profits_on_trending_symbol() {
        let matrix = trending_matrix(60);
        let engine = BacktestEngine::new(BacktestConfig {
            top_k: 1,
            ..Default::default()
        });
        let result = engine
            .run(&WeightVector::equal(), &matrix, full_span(&matrix))
            .unwrap();

        assert_eq!(result.period_returns.len(), 59);
        assert!(result.total_return > 0.0);
        assert!(result.net_sharpe.is_some());
        assert!(result.hit_rate > 0.9);
    }

    #[test]
    fn test_empty_interval_is_data_error() {
        let matrix = trending_matrix(10);
        let engine = BacktestEngine::new(BacktestConfig::default());
        let interval = DateInterval::new(date(2021, 1, 1), date(2021, 6, 30));
        assert!(matches!(
            engine.run(&WeightVector::equal(), &matrix, interval),
            Err(DataError::EmptyInterval { .. })
        ));
    }

    #[test]
    fn test_costs_reduce_returns() {
        let matrix = trending_matrix(60);
        let interval = full_span(&matrix);

        let with_costs = BacktestEngine::new(BacktestConfig {
            top_k: 1,
            ..Default::default()
        });
        let without_costs = BacktestEngine::new(BacktestConfig {
            top_k: 1,
            use_cost_model: false,
            ..Default::default()
        });

        let net = with_costs
            .run(&WeightVector::equal(), &matrix, interval)
            .unwrap();
        let gross = without_costs
            .run(&WeightVector::equal(), &matrix, interval)
            .unwrap();

        assert!(net.total_return <= gross.total_return);
        assert!(net.total_cost > Decimal::ZERO);
        assert_eq!(gross.total_cost, Decimal::ZERO);
    }

    #[test]
    fn test_illiquid_churn_goes_cost_negative() {
        // QA-01: daily churn between two thin names at ~10% of ADV, with
        // punitive impact calibration, must drive net Sharpe negative.
        let start = date(2020, 1, 1);
        let mut rows = Vec::new();
        let mut price = 100.0;
        for i in 0..60 {
            let d = start + chrono::Duration::days(i as i64);
            // Scores flip sign on alternating days, forcing a full
            // portfolio swap at every rebalance.
            let flip = if i % 2 == 0 { 0.8 } else { -0.8 };
            let mut a = row("ILLA", d, flip, price, 200_000.0);
            let mut b = row("ILLB", d, -flip, price, 200_000.0);
            a.atr_14 = price * 0.05;
            b.atr_14 = price * 0.05;
            rows.push(a);
            rows.push(b);
            price *= 1.0005;
        }
        let matrix = FactorMatrix::from_rows(rows).unwrap();

        let cost = CostModelConfig {
            commission_rate: 0.001,
            impact_constant: 0.2,
            impact_exponent: 0.9,
            capacity_limit: 0.01,
        };
        let engine = BacktestEngine::new(BacktestConfig {
            top_k: 1,
            initial_equity: dec!(20_000),
            sizer: PositionSizerConfig {
                risk_budget_pct: 0.05,
            },
            cost,
            ..Default::default()
        });

        let result = engine
            .run(&WeightVector::equal(), &matrix, full_span(&matrix))
            .unwrap();

        assert!(result.capacity_breaches > 0);
        assert!(result.net_sharpe.expect("series has variance") < 0.0);
        assert!(result.total_return < 0.0);
    }

    #[test]
    fn test_delisted_symbol_never_improves_metrics() {
        // QA-03: a symbol that collapses to near-zero must not lift
        // aggregate performance relative to a run without it.
        let start = date(2020, 1, 1);
        let mut base_rows = Vec::new();
        let mut all_rows = Vec::new();
        let mut up = 100.0;
        let mut dead: f64 = 100.0;
        for i in 0..60 {
            let d = start + chrono::Duration::days(i as i64);
            let up_row = row("UP", d, 0.6, up, 5_000_000.0);
            base_rows.push(up_row.clone());
            all_rows.push(up_row);
            // High score lures selection in, then the price collapses.
            all_rows.push(row("DEAD", d, 0.9, dead.max(0.01), 5_000_000.0));
            up *= 1.002;
            if i >= 30 {
                dead *= 0.80;
            }
        }
        let clean = FactorMatrix::from_rows(base_rows).unwrap();
        let injected = FactorMatrix::from_rows(all_rows).unwrap();

        let engine = BacktestEngine::new(BacktestConfig {
            top_k: 2,
            ..Default::default()
        });
        let clean_result = engine
            .run(&WeightVector::equal(), &clean, full_span(&clean))
            .unwrap();
        let injected_result = engine
            .run(&WeightVector::equal(), &injected, full_span(&injected))
            .unwrap();

        assert!(injected_result.total_return <= clean_result.total_return);
    }

    #[test]
    fn test_degenerate_series_reported_not_zeroed() {
        // A sizer budget too small for one share produces an empty book
        // and a zero-variance return series.
        let matrix = trending_matrix(10);
        let engine = BacktestEngine::new(BacktestConfig {
            top_k: 1,
            initial_equity: dec!(10),
            ..Default::default()
        });
        let result = engine
            .run(&WeightVector::equal(), &matrix, full_span(&matrix))
            .unwrap();

        assert!(result.is_degenerate());
        assert_eq!(result.net_sharpe, None);
    }

    #[test]
    fn test_regime_halt_blocks_entries() {
        let matrix = trending_matrix(30);
        let (start, end) = matrix.date_span();
        // Halt every date: no position is ever opened.
        let halted = RegimeCalendar::new(matrix.dates().iter().copied());

        let engine = BacktestEngine::new(BacktestConfig {
            top_k: 1,
            ..Default::default()
        })
        .with_regime(halted);

        let result = engine
            .run(&WeightVector::equal(), &matrix, DateInterval::new(start, end))
            .unwrap();
        assert!(result.equity_curve.iter().all(|p| p.open_positions == 0));
        assert!(result.is_degenerate());
    }

    #[test]
    fn test_deterministic_across_runs() {
        let matrix = trending_matrix(40);
        let engine = BacktestEngine::new(BacktestConfig::default());
        let interval = full_span(&matrix);

        let a = engine
            .run(&WeightVector::equal(), &matrix, interval)
            .unwrap();
        let b = engine
            .run(&WeightVector::equal(), &matrix, interval)
            .unwrap();

        assert_eq!(a.period_returns, b.period_returns);
        assert_eq!(a.net_sharpe, b.net_sharpe);
        assert_eq!(a.total_cost, b.total_cost);
    }

    #[test]
    fn test_sharpe_ratio_edge_cases() {
        assert_eq!(sharpe_ratio(&[]), None);
        assert_eq!(sharpe_ratio(&[0.01]), None);
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01]), None);
        assert!(sharpe_ratio(&[0.01, -0.005, 0.02]).is_some());
    }
}
