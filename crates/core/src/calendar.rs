use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive calendar-date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Window starting at `start` and ending `months` calendar months later.
    pub fn months_from(start: NaiveDate, months: u32) -> Self {
        DateRange {
            start,
            end: add_months_clamped(start, months),
        }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn num_days(self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Adds calendar months, clamping the day to the last day of the target
/// month (Jan 31 + 1 month = Feb 28/29).
pub fn add_months_clamped(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Strict `YYYY-MM-DD` parse.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

pub fn format_iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn date_range_contains_is_inclusive() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 12, 31));
        assert!(range.contains(date(2024, 6, 15)));
        assert!(range.contains(date(2024, 1, 1)));
        assert!(range.contains(date(2024, 12, 31)));
        assert!(!range.contains(date(2023, 12, 31)));
        assert!(!range.contains(date(2025, 1, 1)));
    }

    #[test]
    fn date_range_display() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 12, 31));
        assert_eq!(range.to_string(), "2024-01-01 to 2024-12-31");
    }

    #[test]
    fn months_from_builds_horizon() {
        let range = DateRange::months_from(date(2024, 1, 1), 12);
        assert_eq!(range.end, date(2025, 1, 1));
        assert_eq!(range.num_days(), 366);
    }

    #[test]
    fn add_months_clamps_to_month_end() {
        assert_eq!(add_months_clamped(date(2024, 1, 31), 1), date(2024, 2, 29));
        assert_eq!(add_months_clamped(date(2023, 1, 31), 1), date(2023, 2, 28));
        assert_eq!(add_months_clamped(date(2024, 1, 31), 3), date(2024, 4, 30));
        assert_eq!(add_months_clamped(date(2024, 2, 29), 12), date(2025, 2, 28));
        assert_eq!(add_months_clamped(date(2024, 11, 15), 2), date(2025, 1, 15));
    }

    #[test]
    fn add_zero_months_is_identity() {
        assert_eq!(add_months_clamped(date(2024, 5, 31), 0), date(2024, 5, 31));
    }

    #[test]
    fn parse_iso_date_is_strict() {
        assert_eq!(parse_iso_date("2024-01-03"), Some(date(2024, 1, 3)));
        assert_eq!(parse_iso_date(" 2024-01-03 "), Some(date(2024, 1, 3)));
        assert_eq!(parse_iso_date("2024-02-30"), None);
        assert_eq!(parse_iso_date("2024-1-3"), None);
        assert_eq!(parse_iso_date("03/01/2024"), None);
        assert_eq!(parse_iso_date(""), None);
    }

    #[test]
    fn formats() {
        assert_eq!(format_iso_date(date(2024, 1, 3)), "2024-01-03");
    }
}
