use chrono::{Datelike, NaiveDate};

use crate::error::ApiError;

/// Parses a payroll month given as `YYYY-MM` or `YYYY-MM-DD` into the first
/// day of that month.
pub fn parse_month(raw: &str) -> Result<NaiveDate, ApiError> {
    let raw = raw.trim();
    let parsed = match raw.len() {
        7 => NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d"),
        _ => NaiveDate::parse_from_str(raw, "%Y-%m-%d"),
    };

    parsed
        .map(first_of_month)
        .map_err(|_| ApiError::validation(format!("Invalid month {raw:?}, expected YYYY-MM")))
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn next_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(date)
}

/// Half-open range `[first day, first day of next month)`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = first_of_month(date);
    (first, next_month(first))
}

pub fn format_month(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn accepts_month_and_full_date() {
        assert_eq!(parse_month("2025-03").unwrap(), ymd(2025, 3, 1));
        assert_eq!(parse_month(" 2025-03-17 ").unwrap(), ymd(2025, 3, 1));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_month("2025-13").is_err());
        assert!(parse_month("March").is_err());
        assert!(parse_month("").is_err());
    }

    #[test]
    fn december_rolls_into_next_year() {
        assert_eq!(next_month(ymd(2024, 12, 1)), ymd(2025, 1, 1));
        assert_eq!(next_month(ymd(2025, 1, 31)), ymd(2025, 2, 1));
    }

    #[test]
    fn bounds_are_half_open() {
        let (from, to) = month_bounds(ymd(2025, 2, 14));
        assert_eq!(from, ymd(2025, 2, 1));
        assert_eq!(to, ymd(2025, 3, 1));
        assert_eq!(format_month(from), "2025-02");
    }
}
