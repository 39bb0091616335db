//! Calendar helpers for dashboard range queries and display.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate};

const ISO_DATE: &str = "%Y-%m-%d";
const DISPLAY_DATE: &str = "%d/%m/%Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePeriod {
    Today,
    /// Monday through Sunday of the current week.
    Week,
    /// First through last day of the current month.
    Month,
}

/// Inclusive `(startDate, endDate)` for `period`, as `YYYY-MM-DD`.
pub fn date_range(period: DatePeriod, today: NaiveDate) -> (String, String) {
    let (start, end) = match period {
        DatePeriod::Today => (today, today),
        DatePeriod::Week => {
            let from_monday = u64::from(today.weekday().num_days_from_monday());
            let start = today - Days::new(from_monday);
            (start, start + Days::new(6))
        }
        DatePeriod::Month => {
            let start = today.with_day(1).unwrap_or(today);
            let end = (start + Months::new(1)) - Days::new(1);
            (start, end)
        }
    };
    (start.format(ISO_DATE).to_string(), end.format(ISO_DATE).to_string())
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, ISO_DATE)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// `dd/mm/yyyy`, or `None` if `value` is not a date.
pub fn format_date(value: &str) -> Option<String> {
    parse_date(value).map(|date| date.format(DISPLAY_DATE).to_string())
}

/// `dd/mm/yyyy a las HH:mm`. The time is shown as given.
pub fn format_date_time(date: &str, time: &str) -> Option<String> {
    format_date(date).map(|day| format!("{day} a las {time}"))
}

pub fn is_today(value: &str, today: NaiveDate) -> bool {
    parse_date(value) == Some(today)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn today_is_a_single_day() {
        let range = date_range(DatePeriod::Today, day(2025, 3, 5));
        assert_eq!(range, ("2025-03-05".to_string(), "2025-03-05".to_string()));
    }

    #[test]
    fn week_starts_on_monday() {
        // Wednesday
        let range = date_range(DatePeriod::Week, day(2025, 3, 5));
        assert_eq!(range, ("2025-03-03".to_string(), "2025-03-09".to_string()));
        // Sunday belongs to the week that started six days earlier.
        let range = date_range(DatePeriod::Week, day(2025, 3, 9));
        assert_eq!(range, ("2025-03-03".to_string(), "2025-03-09".to_string()));
        // Crosses a year boundary.
        let range = date_range(DatePeriod::Week, day(2025, 1, 1));
        assert_eq!(range, ("2024-12-30".to_string(), "2025-01-05".to_string()));
    }

    #[test]
    fn month_handles_leap_february() {
        let range = date_range(DatePeriod::Month, day(2024, 2, 14));
        assert_eq!(range, ("2024-02-01".to_string(), "2024-02-29".to_string()));
        let range = date_range(DatePeriod::Month, day(2025, 12, 31));
        assert_eq!(range, ("2025-12-01".to_string(), "2025-12-31".to_string()));
    }

    #[test]
    fn display_formats() {
        assert_eq!(format_date("2025-03-05").as_deref(), Some("05/03/2025"));
        assert_eq!(format_date("2025-03-05T10:15:00Z").as_deref(), Some("05/03/2025"));
        assert_eq!(format_date("mañana"), None);
        assert_eq!(
            format_date_time("2025-03-05", "10:30").as_deref(),
            Some("05/03/2025 a las 10:30")
        );
    }

    #[test]
    fn today_check() {
        let today = day(2025, 3, 5);
        assert!(is_today("2025-03-05", today));
        assert!(!is_today("2025-03-04", today));
        assert!(!is_today("", today));
    }
}
