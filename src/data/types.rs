//! Core data types for factor-weight calibration.
//!
//! These types represent the fundamental data structures used throughout
//! the calibrator: the immutable factor matrix produced upstream by the
//! factor-computation pipeline, and the weight vectors searched by the
//! calibration phases.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance for the weight-simplex sum invariant.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Fatal data-contract violations.
///
/// A `DataError` aborts the whole run; no partial calibration artifact is
/// ever written after one is raised.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Null value in column '{column}' at row {row}")]
    NullField { column: String, row: usize },

    #[error("Factor score out of [-1, 1] range: {column}={value} for {symbol} on {date}")]
    ScoreOutOfRange {
        column: String,
        symbol: String,
        date: NaiveDate,
        value: f64,
    },

    #[error("Non-positive {field} ({value}) for {symbol} on {date}")]
    NonPositiveField {
        field: &'static str,
        symbol: String,
        date: NaiveDate,
        value: f64,
    },

    #[error("Cost undefined for non-positive ADV: {0}")]
    NonPositiveAdv(f64),

    #[error("Position sizing undefined for non-positive volatility: {0}")]
    NonPositiveVolatility(f64),

    #[error("Position sizing undefined for non-positive price: {0}")]
    NonPositivePrice(f64),

    #[error("Factor matrix contains no rows")]
    EmptyMatrix,

    #[error("No factor data between {start} and {end}")]
    EmptyInterval { start: NaiveDate, end: NaiveDate },

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The recognized factor set.
///
/// The order of `ALL` is fixed and doubles as the lexicographic order used
/// to break ties between otherwise equivalent weight vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    RelativeStrength,
    Trend,
    Squeeze,
    Momentum,
    Volume,
}

/// Number of recognized factors.
pub const FACTOR_COUNT: usize = 5;

impl Factor {
    pub const ALL: [Factor; FACTOR_COUNT] = [
        Factor::RelativeStrength,
        Factor::Trend,
        Factor::Squeeze,
        Factor::Momentum,
        Factor::Volume,
    ];

    /// Column name in the upstream factor matrix files.
    pub fn column(&self) -> &'static str {
        match self {
            Factor::RelativeStrength => "rs_score",
            Factor::Trend => "trend_score",
            Factor::Squeeze => "squeeze_score",
            Factor::Momentum => "momentum_score",
            Factor::Volume => "volume_score",
        }
    }

    /// Index into score/weight arrays.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// One `(symbol, date)` observation of the factor matrix.
///
/// Scores are cross-sectionally rank-normalized to `[-1, 1]` upstream;
/// `adv_20` is the trailing 20-day average daily traded dollar volume,
/// `atr_14` the trailing 14-day average true range in dollars per share.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub scores: [f64; FACTOR_COUNT],
    pub adv_20: f64,
    pub atr_14: f64,
    pub close: f64,
}

impl FactorRow {
    pub fn score(&self, factor: Factor) -> f64 {
        self.scores[factor.index()]
    }

    fn validate(&self) -> Result<(), DataError> {
        for factor in Factor::ALL {
            let value = self.score(factor);
            if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
                return Err(DataError::ScoreOutOfRange {
                    column: factor.column().to_string(),
                    symbol: self.symbol.clone(),
                    date: self.date,
                    value,
                });
            }
        }
        for (field, value) in [
            ("close", self.close),
            ("adv_20", self.adv_20),
            ("atr_14", self.atr_14),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DataError::NonPositiveField {
                    field,
                    symbol: self.symbol.clone(),
                    date: self.date,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Immutable factor matrix, one row per `(symbol, date)`.
///
/// Rows are sorted by `(date, symbol)` at construction, which makes
/// per-date cross-sections contiguous slices. The matrix is read-only
/// shared input for the whole run; candidate evaluations may borrow it
/// concurrently.
#[derive(Debug, Clone)]
pub struct FactorMatrix {
    rows: Vec<FactorRow>,
    dates: Vec<NaiveDate>,
}

impl FactorMatrix {
    /// Build a matrix from unsorted rows, validating every field.
    pub fn from_rows(mut rows: Vec<FactorRow>) -> Result<Self, DataError> {
        if rows.is_empty() {
            return Err(DataError::EmptyMatrix);
        }
        for row in &rows {
            row.validate()?;
        }
        rows.sort_by(|a, b| (a.date, a.symbol.as_str()).cmp(&(b.date, b.symbol.as_str())));

        let mut dates = Vec::new();
        for row in &rows {
            if dates.last() != Some(&row.date) {
                dates.push(row.date);
            }
        }

        Ok(Self { rows, dates })
    }

    /// Sorted unique trading dates covered by the matrix.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Trading dates within `[start, end]` inclusive.
    pub fn dates_in(&self, start: NaiveDate, end: NaiveDate) -> &[NaiveDate] {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end);
        &self.dates[lo..hi]
    }

    /// Cross-section of rows for one date, sorted by symbol.
    pub fn cross_section(&self, date: NaiveDate) -> &[FactorRow] {
        let lo = self.rows.partition_point(|r| r.date < date);
        let hi = self.rows.partition_point(|r| r.date <= date);
        &self.rows[lo..hi]
    }

    /// Look up one symbol's row on one date.
    pub fn row(&self, date: NaiveDate, symbol: &str) -> Option<&FactorRow> {
        let section = self.cross_section(date);
        section
            .binary_search_by(|r| r.symbol.as_str().cmp(symbol))
            .ok()
            .map(|i| &section[i])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First and last date in the matrix.
    pub fn date_span(&self) -> (NaiveDate, NaiveDate) {
        (self.dates[0], *self.dates.last().unwrap_or(&self.dates[0]))
    }
}

/// Reasons a candidate weight vector can be rejected at construction.
#[derive(Error, Debug, PartialEq)]
pub enum WeightError {
    #[error("Negative weight {value} for {factor}")]
    Negative { factor: Factor, value: f64 },

    #[error("Weights sum to {sum}, expected 1.0 within {WEIGHT_SUM_TOLERANCE}")]
    SumOffSimplex { sum: f64 },

    #[error("Non-finite weight {value} for {factor}")]
    NonFinite { factor: Factor, value: f64 },
}

/// A point on the factor-weight simplex.
///
/// Non-negative weights over exactly the recognized factor set, summing to
/// 1.0 within [`WEIGHT_SUM_TOLERANCE`]. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    weights: [f64; FACTOR_COUNT],
}

impl WeightVector {
    /// Validate and wrap a raw weight array.
    pub fn new(weights: [f64; FACTOR_COUNT]) -> Result<Self, WeightError> {
        let mut sum = 0.0;
        for factor in Factor::ALL {
            let value = weights[factor.index()];
            if !value.is_finite() {
                return Err(WeightError::NonFinite { factor, value });
            }
            if value < 0.0 {
                return Err(WeightError::Negative { factor, value });
            }
            sum += value;
        }
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(WeightError::SumOffSimplex { sum });
        }
        Ok(Self { weights })
    }

    /// Equal weight across all factors.
    pub fn equal() -> Self {
        Self {
            weights: [1.0 / FACTOR_COUNT as f64; FACTOR_COUNT],
        }
    }

    /// All weight on a single factor (a simplex corner).
    pub fn single(factor: Factor) -> Self {
        let mut weights = [0.0; FACTOR_COUNT];
        weights[factor.index()] = 1.0;
        Self { weights }
    }

    /// `tilt` weight on one factor, the remainder spread equally.
    pub fn tilted(factor: Factor, tilt: f64) -> Result<Self, WeightError> {
        let rest = (1.0 - tilt) / (FACTOR_COUNT - 1) as f64;
        let mut weights = [rest; FACTOR_COUNT];
        weights[factor.index()] = tilt;
        Self::new(weights)
    }

    /// Midpoint of two simplex points (stays on the simplex).
    pub fn midpoint(&self, other: &Self) -> Self {
        let mut weights = [0.0; FACTOR_COUNT];
        for i in 0..FACTOR_COUNT {
            weights[i] = (self.weights[i] + other.weights[i]) / 2.0;
        }
        Self { weights }
    }

    pub fn get(&self, factor: Factor) -> f64 {
        self.weights[factor.index()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    /// Weighted sum of one row's factor scores.
    pub fn composite(&self, row: &FactorRow) -> f64 {
        self.weights
            .iter()
            .zip(row.scores.iter())
            .map(|(w, s)| w * s)
            .sum()
    }

    /// Total lexicographic order over weight arrays, used as the final
    /// deterministic tie-break in candidate selection.
    pub fn lex_cmp(&self, other: &Self) -> Ordering {
        for i in 0..FACTOR_COUNT {
            match self.weights[i].total_cmp(&other.weights[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }

    /// Compact display key, e.g. `rs0.20_tr0.20_sq0.20_mo0.20_vo0.20`.
    pub fn key(&self) -> String {
        format!(
            "rs{:.2}_tr{:.2}_sq{:.2}_mo{:.2}_vo{:.2}",
            self.weights[0], self.weights[1], self.weights[2], self.weights[3], self.weights[4]
        )
    }
}

impl fmt::Display for WeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
