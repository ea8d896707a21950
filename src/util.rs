// Cell text helpers: date parsing, canonical categorical values, and the
// number/date formatting used in messages.
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use num_format::{Locale, ToFormattedString};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    // month-first is preferred for ambiguous slash dates, day-first is the fallback
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y", "%d-%m-%Y", "%d %B %Y", "%d %b %Y",
];

/// Parse a timestamp cell while being forgiving about export formats.
///
/// - Accepts `Option<&str>` so callers can pass through optional cells.
/// - Trims whitespace; empty input is `None`.
/// - Date-only values are placed at midnight.
/// - Returns `None` for anything that cannot be parsed, never a default date.
pub fn parse_datetime_safe(s: Option<&str>) -> Option<NaiveDateTime> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    // Offsets such as `+07:00` or `Z` are dropped; the wall clock is kept.
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// Trim and upper-case a categorical value.
pub fn canonical(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Canonical form of an optional categorical value, with null-like values
/// collapsed to `None`.
pub fn canonical_opt(s: Option<&str>, null_sentinels: &[String]) -> Option<String> {
    let v = canonical(s?);
    if null_sentinels.iter().any(|n| *n == v) || v.is_empty() {
        None
    } else {
        Some(v)
    }
}

/// `part / whole` as a percentage, `None` when `whole` is zero.
pub fn percentage(part: u64, whole: u64) -> Option<f64> {
    if whole == 0 {
        return None;
    }
    Some(part as f64 / whole as f64 * 100.0)
}

pub fn format_percentage(p: Option<f64>) -> String {
    match p {
        Some(v) => format!("{v:.1}%"),
        None => "-".to_string(),
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

/// Long date used in captions, e.g. `05 March 2025`.
pub fn format_long_date(d: NaiveDate) -> String {
    d.format("%d %B %Y").to_string()
}
