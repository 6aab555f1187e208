//! Phase 2 calibrator: gated stochastic search over the weight simplex.
//!
//! Two stages:
//! - **Stage A** — coarse scan of a structured simplex grid (corners,
//!   pairwise midpoints, centroid) to locate a promising region.
//! - **Stage B** — thousands of Dirichlet draws, concentration-biased
//!   toward the coarse optimum. Every draw is non-negative and sums to
//!   one by construction, so no post-hoc normalization is needed.
//!
//! Each candidate is backtested once per walk-forward segment; its net
//! returns are concatenated, bootstrap-tested, and stability-checked.
//! A candidate survives only if the p-value clears significance AND the
//! stability fraction clears its threshold — neither substitutes for the
//! other. If nothing survives, the run ends with NoSignificantAlpha; the
//! gate never falls back to an ungated candidate.
//!
//! Candidate evaluations are pure functions of (weights, shared read-only
//! data) and run on a rayon pool. Sub-seeds derive from (base seed,
//! candidate index), so the winner is identical no matter how the workers
//! are scheduled.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Dirichlet, Distribution};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::backtest::BacktestEngine;
use crate::data::{DataError, Factor, FactorMatrix, WeightVector, FACTOR_COUNT};
use crate::risk::RegimeCalendar;
use crate::validation::{BootstrapValidator, StabilityChecker};
use crate::walkforward::{WalkForwardSegment, WalkForwardSplitter};

use super::artifact::{CalibrationOutcome, SelectionMetrics};
use super::config::CalibrationConfig;
use super::CalibrationError;

/// Trading days per year, for growth-rate annualization.
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Gate verdict for one candidate, aggregated over all its segments.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Bootstrap p-value of the concatenated net return series.
    pub p_value: f64,
    /// Fraction of walk-forward windows with positive net return.
    pub stability: f64,
    /// Combined gate verdict.
    pub passed: bool,
}

/// Complete evaluation record for one candidate weight vector.
#[derive(Debug, Clone)]
pub struct CandidateEvaluation {
    /// Draw index; sub-seeds derive from it.
    pub index: usize,
    pub weights: WeightVector,
    /// Cost-adjusted annualized ratio; `None` marks a degenerate series.
    pub net_sharpe: Option<f64>,
    /// Worst drawdown across segments.
    pub max_drawdown: f64,
    /// Annualized compound growth over the concatenated windows.
    pub growth_rate: f64,
    pub capacity_breaches: usize,
    pub outcome: ValidationOutcome,
}

/// Gated stochastic calibrator.
pub struct Phase2Calibrator {
    config: CalibrationConfig,
    engine: BacktestEngine,
    bootstrap: BootstrapValidator,
    stability: StabilityChecker,
}

impl Phase2Calibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        let engine = BacktestEngine::new(config.backtest.clone());
        let bootstrap = BootstrapValidator::new(config.bootstrap.clone());
        let stability = StabilityChecker::new(config.stability.clone());
        Self {
            config,
            engine,
            bootstrap,
            stability,
        }
    }

    /// Apply a regime scenario to every backtest pass.
    pub fn with_regime(mut self, regime: RegimeCalendar) -> Self {
        self.engine = BacktestEngine::new(self.config.backtest.clone()).with_regime(regime);
        self
    }

    /// Run the full calibration: coarse scan, Dirichlet refinement,
    /// significance gate, deterministic final selection.
    pub fn run(&self, matrix: &FactorMatrix) -> Result<CalibrationOutcome, CalibrationError> {
        self.config.validate()?;
        let started = Instant::now();
        let deadline = self
            .config
            .time_budget_secs
            .map(|secs| started + Duration::from_secs(secs));

        let splitter = WalkForwardSplitter::new(self.config.walkforward.clone());
        let segments = splitter.split(self.config.start, self.config.end)?;
        info!(
            "Phase 2: {} walk-forward segments over {} to {}",
            segments.len(),
            self.config.start,
            self.config.end
        );

        // Stage A: structured coarse scan over the training window (the
        // stretch strictly before any validation window, so the bias never
        // sees gated data).
        let train_interval = segments[0].train;
        let coarse = coarse_grid();
        info!(
            "Stage A: scanning {} grid points over train window {} to {}",
            coarse.len(),
            train_interval.start,
            train_interval.end
        );
        let coarse_results: Vec<Result<(WeightVector, Option<f64>, f64), DataError>> = coarse
            .par_iter()
            .map(|weights| {
                let result = self.engine.run(weights, matrix, train_interval)?;
                Ok((weights.clone(), result.net_sharpe, result.max_drawdown))
            })
            .collect();

        let mut coarse_scores = Vec::with_capacity(coarse.len());
        for result in coarse_results {
            coarse_scores.push(result?);
        }

        let center = coarse_scores
            .iter()
            .filter(|(_, sharpe, _)| sharpe.is_some())
            .min_by(|(wa, sa, da), (wb, sb, db)| {
                let sa = (*sa).unwrap_or(f64::NEG_INFINITY);
                let sb = (*sb).unwrap_or(f64::NEG_INFINITY);
                sb.total_cmp(&sa)
                    .then_with(|| da.total_cmp(db))
                    .then_with(|| wa.lex_cmp(wb))
            })
            .map(|(w, _, _)| w.clone())
            .unwrap_or_else(WeightVector::equal);
        info!("Stage A optimum: {} (Dirichlet center)", center.key());

        // Stage B: concentration-biased Dirichlet refinement.
        let mut alphas = [1.0; FACTOR_COUNT];
        for factor in Factor::ALL {
            alphas[factor.index()] += self.config.concentration * center.get(factor);
        }
        let dirichlet = Dirichlet::new(&alphas)
            .map_err(|e| CalibrationError::Sampler(e.to_string()))?;

        let requested = self.config.dirichlet_draws;
        let draws = match self.config.max_candidates {
            Some(cap) => requested.min(cap),
            None => requested,
        };
        let truncated = draws < requested;
        if truncated {
            info!(
                "Candidate budget: evaluating {} of {} requested draws",
                draws, requested
            );
        }

        info!("Stage B: {} Dirichlet draws (seed {})", draws, self.config.seed);
        let progress = ProgressBar::new(draws as u64);
        progress.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} candidates")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let drawn: Vec<Option<Result<CandidateEvaluation, DataError>>> = (0..draws)
            .into_par_iter()
            .map(|index| {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return None;
                    }
                }

                let candidate_seed =
                    BootstrapValidator::derive_seed(self.config.seed, index as u64);
                let mut rng = StdRng::seed_from_u64(candidate_seed);
                let sample = dirichlet.sample(&mut rng);

                let mut weights = [0.0; FACTOR_COUNT];
                weights.copy_from_slice(&sample);
                let weights = match WeightVector::new(weights) {
                    Ok(w) => w,
                    Err(e) => {
                        warn!("Discarding off-simplex draw {}: {}", index, e);
                        progress.inc(1);
                        return None;
                    }
                };

                let evaluation = self.evaluate(index, weights, matrix, &segments);
                progress.inc(1);
                Some(evaluation)
            })
            .collect();
        progress.finish_and_clear();

        let mut pool = Vec::with_capacity(draws);
        let mut skipped = 0usize;
        for entry in drawn {
            match entry {
                Some(result) => pool.push(result?),
                None => skipped += 1,
            }
        }
        let partial = truncated || skipped > 0;
        if skipped > 0 {
            info!(
                "Time budget exhausted: {} candidates skipped, selecting among {}",
                skipped,
                pool.len()
            );
        }

        // The gate, then the single deterministic reduction.
        let survivors: Vec<&CandidateEvaluation> =
            pool.iter().filter(|c| c.outcome.passed).collect();
        info!(
            "Gate: {} of {} candidates significant and stable",
            survivors.len(),
            pool.len()
        );

        let winner = survivors.into_iter().min_by(|a, b| selection_order(a, b));

        match winner {
            Some(best) => {
                info!(
                    "Phase 2 selection: {} (sharpe {:.2}, p {:.4}, stability {:.2})",
                    best.weights.key(),
                    best.net_sharpe.unwrap_or(f64::NAN),
                    best.outcome.p_value,
                    best.outcome.stability
                );
                Ok(CalibrationOutcome::Selected {
                    weights: best.weights.clone(),
                    metrics: SelectionMetrics {
                        p_value: Some(best.outcome.p_value),
                        stability: Some(best.outcome.stability),
                        net_sharpe: best.net_sharpe.unwrap_or(0.0),
                        max_drawdown: best.max_drawdown,
                        growth_rate: best.growth_rate,
                    },
                    validated: true,
                    partial,
                    candidates_evaluated: pool.len(),
                })
            }
            None => {
                info!("No candidate cleared the significance/stability gate");
                Ok(CalibrationOutcome::NoSignificantAlpha {
                    candidates_evaluated: pool.len(),
                    partial,
                })
            }
        }
    }

    /// Evaluate one candidate across every walk-forward segment.
    ///
    /// Pure: reads only the shared matrix and per-candidate derived seeds.
    fn evaluate(
        &self,
        index: usize,
        weights: WeightVector,
        matrix: &FactorMatrix,
        segments: &[WalkForwardSegment],
    ) -> Result<CandidateEvaluation, DataError> {
        let mut all_returns = Vec::new();
        let mut window_returns = Vec::with_capacity(segments.len());
        let mut max_drawdown = 0.0_f64;
        let mut capacity_breaches = 0usize;

        for segment in segments {
            let result = self.engine.run(&weights, matrix, segment.validation)?;
            all_returns.extend_from_slice(&result.period_returns);
            window_returns.push(result.total_return);
            if result.max_drawdown > max_drawdown {
                max_drawdown = result.max_drawdown;
            }
            capacity_breaches += result.capacity_breaches;
        }

        let net_sharpe = crate::backtest::sharpe_ratio(&all_returns);

        // Bootstrap stream is seeded separately from the draw stream so
        // neither consumes the other's randomness.
        let bootstrap_seed = BootstrapValidator::derive_seed(
            BootstrapValidator::derive_seed(self.config.seed, index as u64),
            1,
        );
        let p_value = self.bootstrap.validate(&all_returns, bootstrap_seed);
        let stability = self.stability.stability(&window_returns);

        // Degenerate series are excluded from the gate, not fatal.
        let passed = net_sharpe.is_some()
            && p_value < self.config.significance_threshold
            && self.stability.passes(stability);

        Ok(CandidateEvaluation {
            index,
            weights,
            net_sharpe,
            max_drawdown,
            growth_rate: annualized_growth(&all_returns),
            capacity_breaches,
            outcome: ValidationOutcome {
                p_value,
                stability,
                passed,
            },
        })
    }
}

/// Corners, pairwise midpoints, and the centroid of the simplex.
pub fn coarse_grid() -> Vec<WeightVector> {
    let corners: Vec<WeightVector> = Factor::ALL.iter().map(|f| WeightVector::single(*f)).collect();

    let mut grid = corners.clone();
    for i in 0..corners.len() {
        for j in (i + 1)..corners.len() {
            grid.push(corners[i].midpoint(&corners[j]));
        }
    }
    grid.push(WeightVector::equal());
    grid
}

/// Total order for final selection: higher Sharpe first, then lower
/// drawdown, then lexicographically smaller weights. `min_by` this order
/// yields the unique winner regardless of pool ordering.
fn selection_order(a: &CandidateEvaluation, b: &CandidateEvaluation) -> Ordering {
    let sharpe_a = a.net_sharpe.unwrap_or(f64::NEG_INFINITY);
    let sharpe_b = b.net_sharpe.unwrap_or(f64::NEG_INFINITY);
    sharpe_b
        .total_cmp(&sharpe_a)
        .then_with(|| a.max_drawdown.total_cmp(&b.max_drawdown))
        .then_with(|| a.weights.lex_cmp(&b.weights))
}

/// Annualized compound growth of a period-return series.
fn annualized_growth(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let compound: f64 = returns.iter().map(|r| 1.0 + r).product();
    if compound <= 0.0 {
        return -1.0;
    }
    let years = returns.len() as f64 / TRADING_DAYS_PER_YEAR;
    compound.powf(1.0 / years) - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::config::Phase;
    use crate::data::{FactorRow, FACTOR_COUNT};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Deterministic pseudo-market: momentum carries a persistent edge,
    /// prices wobble on a fixed recurrence so returns have variance.
    fn edge_matrix(days: usize, symbols: usize, edge: f64) -> FactorMatrix {
        let start = date(2018, 1, 1);
        let mut rows = Vec::new();
        let mut prices: Vec<f64> = (0..symbols).map(|s| 80.0 + 5.0 * s as f64).collect();

        for i in 0..days {
            let d = start + chrono::Duration::days(i as i64);
            for (s, price) in prices.iter_mut().enumerate() {
                // Momentum score fixed per symbol, spread over [-0.9, 0.9].
                let momentum = -0.9 + 1.8 * s as f64 / (symbols - 1) as f64;
                let mut scores = [0.0; FACTOR_COUNT];
                scores[Factor::Momentum.index()] = momentum;
                // Other factors carry uninformative but varied values.
                scores[Factor::Trend.index()] = ((s * 7 + i * 3) % 11) as f64 / 11.0 - 0.5;
                scores[Factor::Volume.index()] = ((s * 5 + i * 2) % 13) as f64 / 13.0 - 0.5;

                rows.push(FactorRow {
                    symbol: format!("SYM{:02}", s),
                    date: d,
                    scores,
                    adv_20: 50_000_000.0,
                    atr_14: *price * 0.02,
                    close: *price,
                });

                // High-momentum names drift up by `edge`; a deterministic
                // wobble keeps the series from being degenerate.
                let wobble = 0.004 * (((s * 13 + i * 7) % 9) as f64 / 4.0 - 1.0);
                *price *= 1.0 + momentum * edge + wobble;
            }
        }
        FactorMatrix::from_rows(rows).unwrap()
    }

    fn test_config(matrix: &FactorMatrix, draws: usize) -> CalibrationConfig {
        let (start, end) = matrix.date_span();
        let mut config = CalibrationConfig::default();
        config.phase = Phase::Phase2;
        config.start = start;
        config.end = end;
        config.seed = 1234;
        config.dirichlet_draws = draws;
        config.bootstrap.resample_count = 200;
        config.walkforward.segment_count = 4;
        config.walkforward.min_train_days = 120;
        config.walkforward.validation_days = 60;
        config.backtest.top_k = 3;
        config
    }

    #[test]
    fn test_coarse_grid_shape() {
        let grid = coarse_grid();
        // 5 corners + C(5,2)=10 midpoints + centroid.
        assert_eq!(grid.len(), 16);
        for w in &grid {
            let sum: f64 = w.as_slice().iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_selection_order_tiebreaks() {
        let eval = |sharpe: Option<f64>, drawdown: f64, w: WeightVector| CandidateEvaluation {
            index: 0,
            weights: w,
            net_sharpe: sharpe,
            max_drawdown: drawdown,
            growth_rate: 0.0,
            capacity_breaches: 0,
            outcome: ValidationOutcome {
                p_value: 0.01,
                stability: 1.0,
                passed: true,
            },
        };

        let a = eval(Some(2.0), 0.1, WeightVector::equal());
        let b = eval(Some(1.0), 0.05, WeightVector::equal());
        assert_eq!(selection_order(&a, &b), Ordering::Less);

        // Same Sharpe: lower drawdown wins.
        let c = eval(Some(1.0), 0.2, WeightVector::equal());
        assert_eq!(selection_order(&b, &c), Ordering::Less);

        // Same Sharpe and drawdown: lexicographically smaller weights win.
        let d = eval(Some(1.0), 0.05, WeightVector::single(Factor::RelativeStrength));
        assert_eq!(selection_order(&b, &d), Ordering::Less);
    }

    #[test]
    fn test_strong_edge_selects_and_validates() {
        let matrix = edge_matrix(500, 12, 0.004);
        let config = test_config(&matrix, 60);
        let calibrator = Phase2Calibrator::new(config);

        let outcome = calibrator.run(&matrix).unwrap();
        match outcome {
            CalibrationOutcome::Selected {
                weights,
                metrics,
                validated,
                partial,
                ..
            } => {
                assert!(validated);
                assert!(!partial);
                let p = metrics.p_value.expect("phase 2 always records p");
                assert!(p < 0.05);
                assert!(metrics.stability.expect("phase 2 records stability") >= 0.65);
                // The edge lives in momentum; the winner should lean there.
                assert!(weights.get(Factor::Momentum) > 0.2);
            }
            other => panic!("expected selection on a strong edge, got {:?}", other),
        }
    }

    #[test]
    fn test_no_edge_yields_no_significant_alpha() {
        // Zero edge: price moves are pure deterministic wobble with no
        // relation to any factor. Nothing should clear the gate.
        let matrix = edge_matrix(500, 12, 0.0);
        let config = test_config(&matrix, 40);
        let calibrator = Phase2Calibrator::new(config);

        let outcome = calibrator.run(&matrix).unwrap();
        match outcome {
            CalibrationOutcome::NoSignificantAlpha {
                candidates_evaluated,
                ..
            } => {
                assert!(candidates_evaluated > 0);
            }
            CalibrationOutcome::Selected { metrics, .. } => {
                // If anything slipped through it must at least carry a
                // formally significant p-value; the gate never reports an
                // ungated winner.
                assert!(metrics.p_value.unwrap() < 0.05);
                assert!(metrics.stability.unwrap() >= 0.65);
            }
        }
    }

    #[test]
    fn test_identical_seed_identical_selection() {
        let matrix = edge_matrix(450, 10, 0.004);
        let config = test_config(&matrix, 50);

        let a = Phase2Calibrator::new(config.clone()).run(&matrix).unwrap();
        let b = Phase2Calibrator::new(config).run(&matrix).unwrap();

        match (a, b) {
            (
                CalibrationOutcome::Selected {
                    weights: wa,
                    metrics: ma,
                    ..
                },
                CalibrationOutcome::Selected {
                    weights: wb,
                    metrics: mb,
                    ..
                },
            ) => {
                assert_eq!(wa.lex_cmp(&wb), Ordering::Equal);
                assert_eq!(ma.p_value, mb.p_value);
                assert_eq!(ma.net_sharpe, mb.net_sharpe);
            }
            (
                CalibrationOutcome::NoSignificantAlpha {
                    candidates_evaluated: ca,
                    ..
                },
                CalibrationOutcome::NoSignificantAlpha {
                    candidates_evaluated: cb,
                    ..
                },
            ) => assert_eq!(ca, cb),
            _ => panic!("two identical runs disagreed on the outcome kind"),
        }
    }

    #[test]
    fn test_end_to_end_wide_universe() {
        // A 50-symbol universe over several years must terminate with
        // either exactly one weight vector plus metrics or an explicit
        // NoSignificantAlpha — never an empty-but-successful result.
        let matrix = edge_matrix(1_100, 50, 0.002);
        let mut config = test_config(&matrix, 100);
        config.walkforward.segment_count = 6;
        config.walkforward.min_train_days = 365;
        config.walkforward.validation_days = 91;
        config.backtest.top_k = 10;
        let calibrator = Phase2Calibrator::new(config);

        match calibrator.run(&matrix).unwrap() {
            CalibrationOutcome::Selected {
                weights, metrics, ..
            } => {
                let sum: f64 = weights.as_slice().iter().sum();
                assert!((sum - 1.0).abs() < 1e-6);
                assert!(weights.as_slice().iter().all(|w| *w >= 0.0));
                assert!(metrics.p_value.is_some());
                assert!(metrics.stability.is_some());
            }
            CalibrationOutcome::NoSignificantAlpha {
                candidates_evaluated,
                ..
            } => assert_eq!(candidates_evaluated, 100),
        }
    }

    #[test]
    fn test_candidate_budget_flags_partial() {
        let matrix = edge_matrix(450, 10, 0.004);
        let mut config = test_config(&matrix, 50);
        config.max_candidates = Some(10);
        let calibrator = Phase2Calibrator::new(config);

        let outcome = calibrator.run(&matrix).unwrap();
        let partial = match outcome {
            CalibrationOutcome::Selected { partial, .. } => partial,
            CalibrationOutcome::NoSignificantAlpha { partial, .. } => partial,
        };
        assert!(partial);
    }
}
