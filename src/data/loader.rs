//! Loader for upstream factor-matrix parquet files.
//!
//! The factor-computation pipeline writes one row per (symbol, date) with
//! rank-normalized factor scores plus the raw liquidity/volatility fields
//! the cost model needs. This loader reads those files into [`FactorMatrix`]
//! and fails fast on any schema violation: a missing column or a null field
//! is a [`DataError`], never silently defaulted.

use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::info;

use super::types::{DataError, Factor, FactorMatrix, FactorRow, FACTOR_COUNT};

/// Expected columns in the factor matrix files.
pub const EXPECTED_COLUMNS: &[&str] = &[
    "symbol",
    "date",
    "rs_score",
    "trend_score",
    "squeeze_score",
    "momentum_score",
    "volume_score",
    "adv_20",
    "atr_14",
    "close",
];

/// Parquet loader for factor matrices.
pub struct FactorMatrixLoader {
    path: String,
}

impl FactorMatrixLoader {
    /// Create a loader for a single factor-matrix parquet file.
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }

    /// Load and validate the full matrix, restricted to `[start, end]`.
    pub fn load(&self, start: NaiveDate, end: NaiveDate) -> Result<FactorMatrix, DataError> {
        if !Path::new(&self.path).exists() {
            return Err(DataError::FileNotFound(self.path.clone()));
        }

        let lf = LazyFrame::scan_parquet(&self.path, ScanArgsParquet::default())?;
        let df = lf.collect()?;

        // Schema check before touching any values.
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        for expected in EXPECTED_COLUMNS {
            if !names.iter().any(|n| n == expected) {
                return Err(DataError::MissingColumn(expected.to_string()));
            }
        }

        let rows = dataframe_to_rows(&df)?;
        let matrix = FactorMatrix::from_rows(
            rows.into_iter()
                .filter(|r| r.date >= start && r.date <= end)
                .collect(),
        )?;

        let (first, last) = matrix.date_span();
        info!(
            "Loaded factor matrix: {} rows, {} dates ({} to {})",
            matrix.len(),
            matrix.dates().len(),
            first,
            last
        );

        Ok(matrix)
    }
}

/// Convert a validated DataFrame into typed rows.
fn dataframe_to_rows(df: &DataFrame) -> Result<Vec<FactorRow>, DataError> {
    let height = df.height();
    let mut rows = Vec::with_capacity(height);

    let symbol_col = df.column("symbol")?;
    let date_col = df.column("date")?;

    let mut score_cols = Vec::with_capacity(FACTOR_COUNT);
    for factor in Factor::ALL {
        score_cols.push(df.column(factor.column())?);
    }
    let adv_col = df.column("adv_20")?;
    let atr_col = df.column("atr_14")?;
    let close_col = df.column("close")?;

    for idx in 0..height {
        let symbol = symbol_col
            .str()?
            .get(idx)
            .ok_or_else(|| DataError::NullField {
                column: "symbol".to_string(),
                row: idx,
            })?
            .to_string();

        let date = read_date(date_col, idx)?;

        let mut scores = [0.0; FACTOR_COUNT];
        for (factor, col) in Factor::ALL.iter().zip(score_cols.iter()) {
            scores[factor.index()] =
                read_f64(col, idx).ok_or_else(|| DataError::NullField {
                    column: factor.column().to_string(),
                    row: idx,
                })?;
        }

        let adv_20 = read_f64(adv_col, idx).ok_or_else(|| DataError::NullField {
            column: "adv_20".to_string(),
            row: idx,
        })?;
        let atr_14 = read_f64(atr_col, idx).ok_or_else(|| DataError::NullField {
            column: "atr_14".to_string(),
            row: idx,
        })?;
        let close = read_f64(close_col, idx).ok_or_else(|| DataError::NullField {
            column: "close".to_string(),
            row: idx,
        })?;

        rows.push(FactorRow {
            symbol,
            date,
            scores,
            adv_20,
            atr_14,
            close,
        });
    }

    Ok(rows)
}

/// Read a float cell, accepting f64/f32 storage and integer columns
/// (ADV is often written as a whole number upstream).
fn read_f64(series: &Series, idx: usize) -> Option<f64> {
    if let Ok(col) = series.f64() {
        return col.get(idx);
    }
    if let Ok(col) = series.f32() {
        return col.get(idx).map(f64::from);
    }
    if let Ok(col) = series.i64() {
        return col.get(idx).map(|v| v as f64);
    }
    if let Ok(col) = series.i32() {
        return col.get(idx).map(f64::from);
    }
    None
}

/// Read a date cell, accepting native date or `YYYY-MM-DD` string columns.
fn read_date(series: &Series, idx: usize) -> Result<NaiveDate, DataError> {
    if let Ok(col) = series.date() {
        if let Some(days) = col.get(idx) {
            return Ok(date_from_days(days));
        }
    } else if let Ok(col) = series.str() {
        if let Some(s) = col.get(idx) {
            return NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| DataError::NullField {
                column: "date".to_string(),
                row: idx,
            });
        }
    }
    Err(DataError::NullField {
        column: "date".to_string(),
        row: idx,
    })
}

/// Polars stores dates as days since the Unix epoch.
fn date_from_days(days: i32) -> NaiveDate {
    NaiveDate::from_num_days_from_ce_opt(days + 719_163).unwrap_or_default()
}
