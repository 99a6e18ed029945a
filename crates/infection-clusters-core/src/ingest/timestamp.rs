//! Lenient timestamp parsing for exported hospital data.

use chrono::{NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse a timestamp or bare date (midnight). A trailing `Z` is ignored.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    let value = value.strip_suffix('Z').unwrap_or(value);
    if value.is_empty() {
        return None;
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_common_formats() {
        assert_eq!(parse_timestamp("2024-01-05 08:30:00"), Some(expect(2024, 1, 5, 8, 30, 0)));
        assert_eq!(parse_timestamp("2024-01-05T08:30:00Z"), Some(expect(2024, 1, 5, 8, 30, 0)));
        assert_eq!(parse_timestamp("2024-01-05 08:30"), Some(expect(2024, 1, 5, 8, 30, 0)));
        assert_eq!(parse_timestamp("01/05/2024 08:30"), Some(expect(2024, 1, 5, 8, 30, 0)));
    }

    #[test]
    fn test_bare_date_is_midnight() {
        assert_eq!(parse_timestamp(" 2024-01-05 "), Some(expect(2024, 1, 5, 0, 0, 0)));
        assert_eq!(parse_timestamp("2024/01/05"), Some(expect(2024, 1, 5, 0, 0, 0)));
    }

    #[test]
    fn test_fractional_seconds() {
        use chrono::Timelike;
        let parsed = parse_timestamp("2024-01-05 08:30:00.250").unwrap();
        assert_eq!(parsed.nanosecond(), 250_000_000);
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("NaT"), None);
        assert_eq!(parse_timestamp("2024-13-40"), None);
    }
}
