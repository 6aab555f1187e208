//! Phase 1 calibrator: fixed-catalog proof of concept.
//!
//! Evaluates a small, hand-authored catalog of weight vectors over the
//! full lookback range in one pass each — no segmentation, no
//! significance gate. Useful for sanity-checking the pipeline and for
//! cost-model diagnostics (the cost model can be disabled for a pure
//! ranking run). The selection is explicitly flagged unvalidated and
//! will not displace a Phase-2 artifact.

use tracing::info;

use crate::backtest::BacktestEngine;
use crate::data::{Factor, FactorMatrix, WeightVector};
use crate::walkforward::DateInterval;

use super::artifact::{CalibrationOutcome, SelectionMetrics};
use super::config::CalibrationConfig;
use super::CalibrationError;

/// The fixed candidate catalog: equal weight plus single-factor tilts.
///
/// Order matters — catalog position is the final tie-break.
pub fn catalog() -> Vec<WeightVector> {
    let mut candidates = vec![WeightVector::equal()];
    for factor in Factor::ALL {
        if let Ok(w) = WeightVector::tilted(factor, 0.4) {
            candidates.push(w);
        }
    }
    for factor in Factor::ALL {
        if let Ok(w) = WeightVector::tilted(factor, 0.6) {
            candidates.push(w);
        }
    }
    candidates
}

/// Fixed-catalog calibrator.
pub struct Phase1Calibrator {
    config: CalibrationConfig,
    engine: BacktestEngine,
}

impl Phase1Calibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        let engine = BacktestEngine::new(config.backtest.clone());
        Self { config, engine }
    }

    /// Apply a regime scenario to every backtest pass.
    pub fn with_regime(mut self, regime: crate::risk::RegimeCalendar) -> Self {
        self.engine = BacktestEngine::new(self.config.backtest.clone()).with_regime(regime);
        self
    }

    /// Evaluate the catalog and pick the best candidate.
    ///
    /// Selection: maximize cost-adjusted Sharpe among candidates whose
    /// drawdown stays under the ceiling; ties go to higher compound
    /// growth, then to earlier catalog position. Degenerate (zero
    /// variance) candidates are never selectable.
    pub fn run(&self, matrix: &FactorMatrix) -> Result<CalibrationOutcome, CalibrationError> {
        self.config.validate()?;

        let interval = DateInterval::new(self.config.start, self.config.end);
        let candidates = catalog();
        info!(
            "Phase 1: evaluating {} catalog candidates over {} to {}",
            candidates.len(),
            interval.start,
            interval.end
        );

        let mut best: Option<(usize, WeightVector, SelectionMetrics)> = None;

        for (index, weights) in candidates.into_iter().enumerate() {
            let result = self.engine.run(&weights, matrix, interval)?;

            let sharpe = match result.net_sharpe {
                Some(s) => s,
                None => {
                    info!("  {}: degenerate return series, skipped", weights.key());
                    continue;
                }
            };
            if result.max_drawdown > self.config.max_drawdown_ceiling {
                info!(
                    "  {}: drawdown {:.1}% over ceiling, skipped",
                    weights.key(),
                    result.max_drawdown * 100.0
                );
                continue;
            }

            info!(
                "  {}: sharpe {:.2}, growth {:.2}%, drawdown {:.1}%",
                weights.key(),
                sharpe,
                result.growth_rate * 100.0,
                result.max_drawdown * 100.0
            );

            let metrics = SelectionMetrics {
                p_value: None,
                stability: None,
                net_sharpe: sharpe,
                max_drawdown: result.max_drawdown,
                growth_rate: result.growth_rate,
            };

            let replace = match &best {
                None => true,
                Some((_, _, incumbent)) => {
                    match sharpe.total_cmp(&incumbent.net_sharpe) {
                        std::cmp::Ordering::Greater => true,
                        std::cmp::Ordering::Less => false,
                        std::cmp::Ordering::Equal => {
                            // Higher growth wins; catalog order settles the rest
                            // (the incumbent has the earlier position).
                            metrics.growth_rate > incumbent.growth_rate
                        }
                    }
                }
            };
            if replace {
                best = Some((index, weights, metrics));
            }
        }

        let evaluated = catalog().len();
        match best {
            Some((index, weights, metrics)) => {
                info!(
                    "Phase 1 selection: catalog #{} {} (unvalidated)",
                    index,
                    weights.key()
                );
                Ok(CalibrationOutcome::Selected {
                    weights,
                    metrics,
                    validated: false,
                    partial: false,
                    candidates_evaluated: evaluated,
                })
            }
            None => Ok(CalibrationOutcome::NoSignificantAlpha {
                candidates_evaluated: evaluated,
                partial: false,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FactorRow, FACTOR_COUNT};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// A market where momentum works: the momentum-scored symbol trends.
    fn momentum_matrix(days: usize) -> FactorMatrix {
        let start = date(2020, 1, 1);
        let mut rows = Vec::new();
        let mut winner = 100.0;
        let mut loser = 100.0;
        for i in 0..days {
            let d = start + chrono::Duration::days(i as i64);
            let mut scores_w = [0.0; FACTOR_COUNT];
            scores_w[Factor::Momentum.index()] = 0.9;
            let mut scores_l = [0.0; FACTOR_COUNT];
            scores_l[Factor::Momentum.index()] = -0.9;
            rows.push(FactorRow {
                symbol: "WIN".to_string(),
                date: d,
                scores: scores_w,
                adv_20: 10_000_000.0,
                atr_14: winner * 0.02,
                close: winner,
            });
            rows.push(FactorRow {
                symbol: "LOSE".to_string(),
                date: d,
                scores: scores_l,
                adv_20: 10_000_000.0,
                atr_14: loser * 0.02,
                close: loser,
            });
            // Two up days, one down day: net uptrend with real drawdowns.
            winner *= if i % 3 == 2 { 0.995 } else { 1.006 };
            loser *= 0.999;
        }
        FactorMatrix::from_rows(rows).unwrap()
    }

    fn config_for(matrix: &FactorMatrix) -> CalibrationConfig {
        let (start, end) = matrix.date_span();
        let mut config = CalibrationConfig::default();
        config.phase = super::super::config::Phase::Phase1;
        config.start = start;
        config.end = end;
        config.backtest.top_k = 1;
        config.max_drawdown_ceiling = 0.5;
        config
    }

    #[test]
    fn test_catalog_is_fixed_and_on_simplex() {
        let a = catalog();
        let b = catalog();
        assert_eq!(a.len(), 11);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.lex_cmp(y), std::cmp::Ordering::Equal);
        }
        for w in &a {
            let sum: f64 = w.as_slice().iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
            assert!(w.as_slice().iter().all(|x| *x >= 0.0));
        }
    }

    #[test]
    fn test_phase1_prefers_momentum_tilt() {
        let matrix = momentum_matrix(120);
        let calibrator = Phase1Calibrator::new(config_for(&matrix));
        let outcome = calibrator.run(&matrix).unwrap();

        match outcome {
            CalibrationOutcome::Selected {
                weights, validated, ..
            } => {
                // Tilting toward momentum should not lose to tilting away.
                assert!(weights.get(Factor::Momentum) >= 0.2);
                assert!(!validated);
            }
            other => panic!("expected a selection, got {:?}", other),
        }
    }

    #[test]
    fn test_phase1_respects_drawdown_ceiling() {
        let matrix = momentum_matrix(120);
        let mut config = config_for(&matrix);
        // Impossible ceiling: every candidate is excluded.
        config.max_drawdown_ceiling = 1e-9;
        let calibrator = Phase1Calibrator::new(config);
        let outcome = calibrator.run(&matrix).unwrap();
        assert!(!outcome.is_selection());
    }

    #[test]
    fn test_phase1_deterministic() {
        let matrix = momentum_matrix(90);
        let calibrator = Phase1Calibrator::new(config_for(&matrix));

        let a = calibrator.run(&matrix).unwrap();
        let b = calibrator.run(&matrix).unwrap();
        match (a, b) {
            (
                CalibrationOutcome::Selected { weights: wa, .. },
                CalibrationOutcome::Selected { weights: wb, .. },
            ) => assert_eq!(wa.lex_cmp(&wb), std::cmp::Ordering::Equal),
            _ => panic!("expected selections from both runs"),
        }
    }
}
