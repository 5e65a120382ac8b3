//! Base traits and types shared by the harvesting services
//!
//! The traits describe the external collaborators the harvest pipeline
//! needs but does not own: the usage store, the credential registry and the
//! archive of previously downloaded SUSHI responses. Reference
//! implementations live in [`crate::db`], [`crate::credentials`] and
//! [`crate::fallback`].

use async_trait::async_trait;
use chrono::{Datelike, Months, NaiveDate};
use std::collections::BTreeSet;
use std::fmt;
use sushi_common::{ReportType, Result, StatisticsSource, SushiEndpoint, UsageRecord};

// ============================================================================
// Month ranges
// ============================================================================

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Last day of the month containing `date`
pub fn month_end(date: NaiveDate) -> NaiveDate {
    month_start(date)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Inclusive range of reporting months
///
/// Both bounds are always the first day of their month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonthRange {
    begin: NaiveDate,
    end: NaiveDate,
}

impl MonthRange {
    /// Range covering the months of `begin` through `end`
    ///
    /// Returns `None` when `end` precedes `begin`.
    pub fn new(begin: NaiveDate, end: NaiveDate) -> Option<Self> {
        if end < begin {
            return None;
        }
        Some(Self {
            begin: month_start(begin),
            end: month_start(end),
        })
    }

    pub fn begin(&self) -> NaiveDate {
        self.begin
    }

    /// First day of the last month in the range
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Last calendar day covered by the range
    pub fn last_day(&self) -> NaiveDate {
        month_end(self.end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let month = month_start(date);
        month >= self.begin && month <= self.end
    }

    /// Every month in the range, ascending
    pub fn months(&self) -> Vec<NaiveDate> {
        let mut months = Vec::new();
        let mut current = self.begin;
        while current <= self.end {
            months.push(current);
            match current.checked_add_months(Months::new(1)) {
                Some(next) => current = next,
                None => break,
            }
        }
        months
    }
}

impl fmt::Display for MonthRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            self.begin.format("%Y-%m"),
            self.end.format("%Y-%m")
        )
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Identifies the archived response that may stand in for a refused call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FallbackKey {
    pub statistics_source_id: i64,
    pub report_type: ReportType,
    pub range: MonthRange,
}

/// Months already present in the usage store
#[async_trait]
pub trait HarvestLedger: Send + Sync {
    /// Months (first-of-month dates) within `range` already stored for
    /// `source` and `report_type`
    async fn already_harvested(
        &self,
        source: &StatisticsSource,
        report_type: ReportType,
        range: &MonthRange,
    ) -> Result<BTreeSet<NaiveDate>>;
}

/// Destination for normalized usage records
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Store records in one batch, returning the number written
    async fn bulk_insert(&self, records: &[UsageRecord]) -> Result<u64>;
}

/// Lookup of SUSHI credentials per statistics source
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn credentials_for(&self, source: &StatisticsSource) -> Result<Option<SushiEndpoint>>;
}

/// Archive of previously downloaded SUSHI responses
#[async_trait]
pub trait FallbackStore: Send + Sync {
    async fn fallback_file_for(&self, key: &FallbackKey) -> Result<Option<Vec<u8>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_range_rejects_end_before_begin() {
        assert!(MonthRange::new(date(2023, 5, 1), date(2023, 4, 30)).is_none());
    }

    #[test]
    fn test_range_snaps_to_month_starts() {
        let range = MonthRange::new(date(2023, 1, 15), date(2023, 3, 2)).unwrap();
        assert_eq!(range.begin(), date(2023, 1, 1));
        assert_eq!(range.end(), date(2023, 3, 1));
        assert_eq!(range.last_day(), date(2023, 3, 31));
    }

    #[test]
    fn test_months_cross_year_boundary() {
        let range = MonthRange::new(date(2022, 11, 1), date(2023, 2, 1)).unwrap();
        assert_eq!(
            range.months(),
            vec![date(2022, 11, 1), date(2022, 12, 1), date(2023, 1, 1), date(2023, 2, 1)]
        );
    }

    #[test]
    fn test_contains_uses_month_granularity() {
        let range = MonthRange::new(date(2023, 1, 1), date(2023, 2, 1)).unwrap();
        assert!(range.contains(date(2023, 2, 28)));
        assert!(!range.contains(date(2023, 3, 1)));
    }

    #[test]
    fn test_month_end_handles_leap_year() {
        assert_eq!(month_end(date(2024, 2, 10)), date(2024, 2, 29));
        assert_eq!(month_end(date(2023, 12, 5)), date(2023, 12, 31));
    }
}
