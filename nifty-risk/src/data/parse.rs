//! Cell-level parsing for exported market data files.
//!
//! Exchange and vendor exports disagree on date formats and number
//! formatting, so every cell is read as text and parsed here.

use chrono::NaiveDate;

/// Date formats tried in order. Day-first forms come before any
/// month-first interpretation (NSE reports are day-first).
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%Y/%m/%d",
];

/// Parse a date cell, discarding any time-of-day or timezone suffix.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // "2015-01-02 00:00:00+05:30" / "2015-01-02T00:00:00"
    let day_part = match s.find(|c: char| c == 'T' || c == ' ') {
        Some(idx) if idx >= 8 && s[..idx].chars().any(|c| c == '-' || c == '/') => &s[..idx],
        _ => s,
    };

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day_part, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        })
}

/// Parse a numeric cell.
///
/// Accepts thousands separators and accounting negatives:
/// `"1,234.50"` → 1234.5, `"(512.3)"` → -512.3. Non-finite values are
/// rejected.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | ')'))
        .map(|c| if c == '(' { '-' } else { c })
        .collect();

    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2020-03-23"), Some(d(2020, 3, 23)));
        assert_eq!(parse_date("23-03-2020"), Some(d(2020, 3, 23)));
        assert_eq!(parse_date("23/03/2020"), Some(d(2020, 3, 23)));
        assert_eq!(parse_date("23-Mar-2020"), Some(d(2020, 3, 23)));
        assert_eq!(parse_date("2020-03-23 00:00:00+05:30"), Some(d(2020, 3, 23)));
        assert_eq!(parse_date("2020-03-23T00:00:00"), Some(d(2020, 3, 23)));
    }

    #[test]
    fn test_parse_date_day_first() {
        // 01/02 is 1 February, not 2 January
        assert_eq!(parse_date("01/02/2021"), Some(d(2021, 2, 1)));
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("2020-13-45"), None);
    }

    #[test]
    fn test_parse_number_cleanup() {
        assert_eq!(parse_number("1,234.50"), Some(1234.5));
        assert_eq!(parse_number("(512.3)"), Some(-512.3));
        assert_eq!(parse_number(" -7 "), Some(-7.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("inf"), None);
    }
}
