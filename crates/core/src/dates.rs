use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DateError {
    #[error("date missing")]
    Missing,
    #[error("unsupported date \"{0}\"")]
    Unsupported(String),
}

/// Parses the two date shapes German exports use: `DD.MM.YYYY` (also one-digit
/// day/month and two-digit year, assumed 2000s) and ISO `YYYY-MM-DD` with an
/// optional time suffix. Anything else fails rather than guessing.
pub fn parse_flexible_date(raw: &str) -> Result<NaiveDate, DateError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(DateError::Missing);
    }

    if let Some(date) = parse_german(value) {
        return Ok(date);
    }
    if let Some(date) = parse_iso_prefix(value) {
        return Ok(date);
    }

    Err(DateError::Unsupported(value.to_string()))
}

fn parse_german(value: &str) -> Option<NaiveDate> {
    let mut parts = value.split('.');
    let day: u32 = parse_component(parts.next()?, 1, 2)?;
    let month: u32 = parse_component(parts.next()?, 1, 2)?;
    let year_part = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let year: i32 = match year_part.len() {
        4 => year_part.parse().ok()?,
        2 => 2000 + year_part.parse::<i32>().ok()?,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_iso_prefix(value: &str) -> Option<NaiveDate> {
    let head = value.get(0..10)?;
    if value.len() > 10 {
        // Tolerate "2025-03-01T10:00:00" style timestamps, nothing else.
        let sep = value.as_bytes()[10];
        if sep != b'T' && sep != b' ' {
            return None;
        }
    }
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn parse_component(s: &str, min_len: usize, max_len: usize) -> Option<u32> {
    if s.len() < min_len || s.len() > max_len {
        return None;
    }
    s.parse().ok()
}

/// Cheap shape check used when filtering statement body rows: does this cell
/// look like a booking date at all?
pub fn is_likely_date(value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    parse_german(value).is_some() || parse_iso_prefix(value).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_german_dates() {
        assert_eq!(parse_flexible_date("01.03.2025").unwrap(), date(2025, 3, 1));
        assert_eq!(parse_flexible_date("7.3.2025").unwrap(), date(2025, 3, 7));
    }

    #[test]
    fn parses_two_digit_year_as_2000s() {
        assert_eq!(parse_flexible_date("01.03.25").unwrap(), date(2025, 3, 1));
        assert_eq!(parse_flexible_date("31.12.99").unwrap(), date(2099, 12, 31));
    }

    #[test]
    fn parses_iso_dates() {
        assert_eq!(parse_flexible_date("2025-03-01").unwrap(), date(2025, 3, 1));
        assert_eq!(
            parse_flexible_date("2025-03-01T10:30:00").unwrap(),
            date(2025, 3, 1)
        );
    }

    #[test]
    fn rejects_other_shapes() {
        assert!(parse_flexible_date("03/01/2025").is_err());
        assert!(parse_flexible_date("1. März 2025").is_err());
        assert!(parse_flexible_date("20250301").is_err());
        assert_eq!(parse_flexible_date("  "), Err(DateError::Missing));
    }

    #[test]
    fn rejects_impossible_calendar_dates() {
        assert!(parse_flexible_date("31.02.2025").is_err());
        assert!(parse_flexible_date("2025-13-01").is_err());
    }

    #[test]
    fn likely_date_shape_check() {
        assert!(is_likely_date("01.03.2025"));
        assert!(is_likely_date("2025-03-01"));
        assert!(!is_likely_date("Alter Kontostand"));
        assert!(!is_likely_date(""));
    }
}
