//! Calendar-local date helpers.
//!
//! Everything here works on [`NaiveDate`] and whole calendar days, so
//! results never shift across daylight-saving transitions.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveTime};

use crate::error::{RebanhoError, Result};

/// Today's date on the local calendar.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// ISO form used for storage and the remote schema (`2025-03-10`).
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Display form used in listings (`10/03/2025`).
pub fn format_display(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Add (or subtract) whole days.
pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::days(days))
}

/// Weekday index with 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Build a date from a year, zero-based month and day, letting an
/// out-of-range month roll into the next year and an out-of-range day
/// roll into the following month(s). Day 0 is the last day of the
/// previous month.
pub fn ymd_overflowing(year: i32, month0: i64, day: u32) -> Option<NaiveDate> {
    let total = year as i64 * 12 + month0;
    let y = i32::try_from(total.div_euclid(12)).ok()?;
    let m = total.rem_euclid(12) as u32 + 1;
    let first = NaiveDate::from_ymd_opt(y, m, 1)?;
    add_days(first, day as i64 - 1)
}

/// Advance by whole calendar months, keeping the day number and letting it
/// overflow when the target month is shorter (Jan 31 + 1 month = Mar 3 in
/// a non-leap year).
pub fn add_months_overflowing(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    ymd_overflowing(date.year(), date.month0() as i64 + months as i64, date.day())
}

/// Replace the day of month, overflowing into the next month when the day
/// does not exist (April 31 = May 1).
pub fn with_day_overflowing(date: NaiveDate, day: u32) -> Option<NaiveDate> {
    ymd_overflowing(date.year(), date.month0() as i64, day)
}

/// Parse `YYYY-MM-DD` (optionally followed by a time part, as returned by
/// the remote store) or the display form `DD/MM/YYYY`.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let s = input.trim();
    let parsed = if s.len() >= 10 && s.as_bytes()[4] == b'-' {
        s.get(..10)
            .and_then(|iso| NaiveDate::parse_from_str(iso, "%Y-%m-%d").ok())
    } else {
        NaiveDate::parse_from_str(s, "%d/%m/%Y").ok()
    };

    parsed.ok_or_else(|| {
        RebanhoError::Validation(format!(
            "invalid date '{}', expected YYYY-MM-DD or DD/MM/YYYY",
            input
        ))
    })
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time(input: &str) -> Result<NaiveTime> {
    let s = input.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| RebanhoError::Validation(format!("invalid time '{}', expected HH:MM", input)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_format_roundtrip_forms() {
        let date = d(2025, 3, 9);
        assert_eq!(format_date(date), "2025-03-09");
        assert_eq!(format_display(date), "09/03/2025");
        assert_eq!(parse_date("2025-03-09").unwrap(), date);
        assert_eq!(parse_date("09/03/2025").unwrap(), date);
        assert_eq!(parse_date("2025-03-09T00:00:00+00:00").unwrap(), date);
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(matches!(
            parse_date("next tuesday"),
            Err(RebanhoError::Validation(_))
        ));
        assert!(parse_date("2025-02-30").is_err());
    }

    #[test]
    fn test_add_days_crosses_dst_and_year() {
        // Brazilian and European DST changes happen around these dates.
        assert_eq!(add_days(d(2025, 3, 29), 1), Some(d(2025, 3, 30)));
        assert_eq!(add_days(d(2025, 3, 30), 1), Some(d(2025, 3, 31)));
        assert_eq!(add_days(d(2024, 12, 31), 1), Some(d(2025, 1, 1)));
        assert_eq!(add_days(d(2025, 1, 1), -1), Some(d(2024, 12, 31)));
    }

    #[test]
    fn test_weekday_index_starts_on_sunday() {
        assert_eq!(weekday_index(d(2025, 3, 9)), 0); // Sunday
        assert_eq!(weekday_index(d(2025, 3, 10)), 1); // Monday
        assert_eq!(weekday_index(d(2025, 3, 15)), 6); // Saturday
    }

    #[test]
    fn test_month_overflow() {
        assert_eq!(add_months_overflowing(d(2025, 1, 31), 1), Some(d(2025, 3, 3)));
        assert_eq!(add_months_overflowing(d(2024, 1, 31), 1), Some(d(2024, 3, 2)));
        assert_eq!(add_months_overflowing(d(2025, 12, 15), 1), Some(d(2026, 1, 15)));
        assert_eq!(with_day_overflowing(d(2025, 4, 10), 31), Some(d(2025, 5, 1)));
        assert_eq!(with_day_overflowing(d(2025, 4, 10), 0), Some(d(2025, 3, 31)));
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("07:30").unwrap(), NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        assert_eq!(parse_time("07:30:15").unwrap(), NaiveTime::from_hms_opt(7, 30, 15).unwrap());
        assert!(parse_time("7h30").is_err());
    }
}
