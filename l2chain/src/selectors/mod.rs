//! File selectors: produce the input files of a run.
//!
//! A selector answers one date-range query with a finite, ordered list of
//! [`FileId`]s. "No files in range" is an empty list; an inaccessible source
//! is a [`SelectorError`] and terminates the run.

mod cryosat;
mod filename;

pub use cryosat::CryoSatFileSelector;
pub use filename::L1bFileName;

use crate::core::FileId;
use crate::errors::SelectorError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Inclusive date range of a selector query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorQuery {
    /// First day of the range.
    pub start: NaiveDate,
    /// Last day of the range (inclusive).
    pub end: NaiveDate,
}

impl SelectorQuery {
    /// Creates a query for `start..=end`.
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Creates a query for a single day.
    #[must_use]
    pub fn day(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    /// Returns true if `date` lies in the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Returns every `(year, month)` the range touches, in order.
    #[must_use]
    pub fn months(&self) -> Vec<(i32, u32)> {
        let mut months = Vec::new();
        let (mut year, mut month) = (self.start.year(), self.start.month());
        while (year, month) <= (self.end.year(), self.end.month()) {
            months.push((year, month));
            if month == 12 {
                year += 1;
                month = 1;
            } else {
                month += 1;
            }
        }
        months
    }

    /// Checks the query against a selector.
    ///
    /// # Errors
    ///
    /// Returns `SelectorError::InvalidQuery` if the range is reversed.
    pub fn validate(&self, selector: &str) -> Result<(), SelectorError> {
        if self.end < self.start {
            return Err(SelectorError::InvalidQuery {
                selector: selector.to_string(),
                reason: format!("end date {} is before start date {}", self.end, self.start),
            });
        }
        Ok(())
    }
}

/// Produces the ordered input files for a query.
///
/// Selectors are re-queried on every run; results are never cached.
pub trait FileSelector: Send + Sync + Debug {
    /// Returns the selector's configuration name (e.g. "find_lrm").
    fn name(&self) -> &str;

    /// Lists matching files.
    ///
    /// # Errors
    ///
    /// Returns `SelectorError::SourceUnreachable` when the source cannot be
    /// accessed, never an empty list.
    fn select(&self, query: &SelectorQuery) -> Result<Vec<FileId>, SelectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_months_across_year_boundary() {
        let query = SelectorQuery::new(date(2020, 11, 15), date(2021, 2, 1));
        assert_eq!(query.months(), vec![(2020, 11), (2020, 12), (2021, 1), (2021, 2)]);
    }

    #[test]
    fn test_single_day() {
        let query = SelectorQuery::day(date(2020, 9, 30));
        assert_eq!(query.months(), vec![(2020, 9)]);
        assert!(query.contains(date(2020, 9, 30)));
        assert!(!query.contains(date(2020, 10, 1)));
    }

    #[test]
    fn test_reversed_range_is_invalid() {
        let query = SelectorQuery::new(date(2021, 1, 1), date(2020, 1, 1));
        assert!(query.months().is_empty());
        assert!(matches!(
            query.validate("find_lrm"),
            Err(SelectorError::InvalidQuery { .. })
        ));
    }
}
