//! Cost-aware backtesting engine.
//!
//! This module provides the candidate-evaluation core:
//! - Composite scoring and top-K selection
//! - Volatility-budget position sizing
//! - Turnover costing through the transaction cost model
//! - Equity curve, drawdown, and net-ratio statistics

pub mod engine;

pub use engine::{
    sharpe_ratio, BacktestConfig, BacktestEngine, EquityPoint, Position, SegmentResult,
};
