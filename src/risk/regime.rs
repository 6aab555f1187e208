//! Regime scenario input.
//!
//! The serving-time regime monitor (kill switch) lives outside this crate;
//! backtests can optionally replay its "safe to open new positions" signal
//! as a scenario parameter. The calendar is a plain date set supplied by
//! the caller — the calibrator never computes the signal itself.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Dates on which opening new positions is disallowed.
///
/// Existing positions are still marked to market and may be unwound; only
/// entries are suppressed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegimeCalendar {
    halted_dates: BTreeSet<NaiveDate>,
}

impl RegimeCalendar {
    pub fn new(halted_dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            halted_dates: halted_dates.into_iter().collect(),
        }
    }

    /// Whether new positions may be opened on `date`.
    pub fn safe_to_open(&self, date: NaiveDate) -> bool {
        !self.halted_dates.contains(&date)
    }

    pub fn halted_count(&self) -> usize {
        self.halted_dates.len()
    }
}
