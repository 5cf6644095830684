//! Calendar helpers for attendance days.
//!
//! Days travel through the API and the database as `YYYY-MM-DD` strings.
//! Services are the only place they become [`NaiveDate`] values.

use std::ops::RangeInclusive;

use chrono::{Datelike, Days, NaiveDate};

use crate::services::ServiceError;

pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Years a `YYYY-MM-DD` day can carry.
pub const YEARS: RangeInclusive<i32> = 1..=9999;

pub fn parse_day(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DAY_FORMAT)
        .ok()
        .filter(|date| YEARS.contains(&date.year()))
}

pub fn format_day(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` day or fail with a 400-class error naming the field.
pub fn require_day(input: &str, field: &str) -> Result<NaiveDate, ServiceError> {
    parse_day(input).ok_or_else(|| {
        ServiceError::bad_request(format!("{field} must be a date in YYYY-MM-DD form"))
    })
}

/// `None` only when the walk back leaves chrono's calendar.
pub fn sunday_on_or_before(date: NaiveDate) -> Option<NaiveDate> {
    let offset = date.weekday().num_days_from_sunday();
    date.checked_sub_days(Days::new(u64::from(offset)))
}

pub fn sundays_in_month(year: i32, month: u32) -> Vec<NaiveDate> {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return Vec::new();
    };

    let until_sunday = (7 - first.weekday().num_days_from_sunday()) % 7;
    let mut next = first.checked_add_days(Days::new(u64::from(until_sunday)));
    let mut sundays = Vec::new();
    while let Some(day) = next.filter(|day| day.month() == month) {
        sundays.push(day);
        next = day.checked_add_days(Days::new(7));
    }
    sundays
}

/// Render a day the way the attendance screens title it, e.g. `Sunday, 7 January 2024`.
pub fn human_label(date: NaiveDate) -> String {
    date.format("%A, %-d %B %Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn is_sunday(date: NaiveDate) -> bool {
        date.weekday() == Weekday::Sun
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parse_and_format_round_trip_iso_days() {
        let parsed = parse_day(" 2024-02-29 ").unwrap();
        assert_eq!(parsed, day(2024, 2, 29));
        assert_eq!(format_day(parsed), "2024-02-29");
        assert!(parse_day("2023-02-29").is_none());
        assert!(parse_day("07/01/2024").is_none());
    }

    #[test]
    fn require_day_names_the_field() {
        let err = require_day("yesterday", "date").unwrap_err();
        assert!(err.to_string().contains("date must be a date"));
    }

    #[test]
    fn sunday_on_or_before_walks_back_to_sunday() {
        // 2024-01-10 is a Wednesday.
        assert_eq!(sunday_on_or_before(day(2024, 1, 10)), Some(day(2024, 1, 7)));
        assert_eq!(sunday_on_or_before(day(2024, 1, 7)), Some(day(2024, 1, 7)));
        assert_eq!(sunday_on_or_before(day(2024, 1, 6)), Some(day(2023, 12, 31)));
        assert_eq!(sunday_on_or_before(NaiveDate::MIN), None);
    }

    #[test]
    fn calendar_edges_do_not_overflow() {
        let last_year = NaiveDate::MAX.year();
        let sundays = sundays_in_month(last_year, NaiveDate::MAX.month());
        assert!(sundays.iter().all(|d| is_sunday(*d) && *d <= NaiveDate::MAX));
        assert!(sundays_in_month(last_year + 1, 1).is_empty());
    }

    #[test]
    fn parse_day_rejects_years_outside_four_digits() {
        assert_eq!(parse_day("9999-12-31"), Some(day(9999, 12, 31)));
        assert!(parse_day("+10000-01-01").is_none());
        assert!(parse_day("0000-01-01").is_none());
    }

    #[test]
    fn sundays_in_month_lists_every_sunday() {
        let sundays = sundays_in_month(2024, 3);
        assert_eq!(
            sundays,
            vec![
                day(2024, 3, 3),
                day(2024, 3, 10),
                day(2024, 3, 17),
                day(2024, 3, 24),
                day(2024, 3, 31)
            ]
        );
        assert!(sundays.iter().all(|d| is_sunday(*d)));

        // September 2024 starts on a Sunday.
        assert_eq!(sundays_in_month(2024, 9).first(), Some(&day(2024, 9, 1)));
        assert!(sundays_in_month(2024, 13).is_empty());
    }

    #[test]
    fn human_label_spells_out_the_day() {
        assert_eq!(human_label(day(2024, 1, 7)), "Sunday, 7 January 2024");
    }
}
