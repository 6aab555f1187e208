//! Walk-forward segment generation.
//!
//! Produces chronologically ordered (train, validation) date intervals for
//! leakage-free evaluation: every validation interval starts strictly after
//! its train interval ends, and validation intervals never overlap. The
//! split is anchored — training always starts at the range start and grows
//! as validation windows roll forward. Purely deterministic.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SplitError {
    #[error("Date range end {end} is not after start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Segment count must be at least 1")]
    ZeroSegments,

    #[error("Validation length must be at least 1 day")]
    ZeroValidationLength,

    #[error("Minimum train length must be at least 1 day")]
    ZeroTrainLength,

    #[error("Range of {available} days cannot fit {required} days of train + validation")]
    InsufficientData { required: i64, available: i64 },
}

/// A closed date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateInterval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateInterval {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Inclusive length in calendar days.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn overlaps(&self, other: &DateInterval) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// One walk-forward segment: a training window and the out-of-sample
/// validation window immediately after it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSegment {
    /// Segment number (1-indexed).
    pub segment_num: usize,
    pub train: DateInterval,
    pub validation: DateInterval,
}

/// Walk-forward geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    /// Number of (train, validation) segments.
    pub segment_count: usize,
    /// Minimum training window in calendar days (first segment).
    pub min_train_days: i64,
    /// Validation window in calendar days.
    pub validation_days: i64,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            segment_count: 6,
            min_train_days: 365,
            validation_days: 91,
        }
    }
}

/// Deterministic splitter over a calendar range.
pub struct WalkForwardSplitter {
    config: WalkForwardConfig,
}

impl WalkForwardSplitter {
    pub fn new(config: WalkForwardConfig) -> Self {
        Self { config }
    }

    /// Partition `[start, end]` into ordered (train, validation) segments.
    ///
    /// Validation windows tile forward without gaps or overlap; each train
    /// window is anchored at `start` and ends the day before its
    /// validation window begins.
    pub fn split(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<WalkForwardSegment>, SplitError> {
        if end <= start {
            return Err(SplitError::InvalidRange { start, end });
        }
        if self.config.segment_count == 0 {
            return Err(SplitError::ZeroSegments);
        }
        if self.config.validation_days < 1 {
            return Err(SplitError::ZeroValidationLength);
        }
        if self.config.min_train_days < 1 {
            return Err(SplitError::ZeroTrainLength);
        }

        let available = (end - start).num_days() + 1;
        let required =
            self.config.min_train_days + self.config.segment_count as i64 * self.config.validation_days;
        if available < required {
            return Err(SplitError::InsufficientData {
                required,
                available,
            });
        }

        let mut segments = Vec::with_capacity(self.config.segment_count);
        for i in 0..self.config.segment_count {
            let validation_start = start
                + Duration::days(self.config.min_train_days + i as i64 * self.config.validation_days);
            let validation_end = validation_start + Duration::days(self.config.validation_days - 1);
            let train_end = validation_start - Duration::days(1);

            segments.push(WalkForwardSegment {
                segment_num: i + 1,
                train: DateInterval::new(start, train_end),
                validation: DateInterval::new(validation_start, validation_end),
            });
        }

        Ok(segments)
    }
}
