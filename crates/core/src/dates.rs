//! Class-date normalization.
//!
//! Scheduled sessions carry their class date in whichever format the
//! scheduler wrote: RFC 3339 datetimes, naive ISO datetimes, `yyyy-mm-dd`
//! or `dd-mm-yyyy`. Everything that compares calendar days goes through
//! [`normalize_class_date`]; anything it cannot read is "not today".

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

use crate::types::Timestamp;

/// Offset used when the caller does not configure one (IST, `+05:30`).
pub const DEFAULT_REFERENCE_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Naive datetime layouts accepted before falling back to bare dates.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// The default reference zone.
pub fn default_reference_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_REFERENCE_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Parse a `+HH:MM` / `-HH:MM` / `Z` offset string.
pub fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Some(Utc.fix());
    }
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Reduce a stored class date to a calendar date in `reference`.
///
/// Datetimes that carry an offset are converted into the reference zone
/// first; naive datetimes and bare dates are taken as already local.
pub fn normalize_class_date(raw: &str, reference: &FixedOffset) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(reference).date_naive());
    }

    if raw.len() > 10 {
        return NAIVE_DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|dt| dt.date());
    }

    // Dispatch on separator position so `05-06-2024` is never read as a year.
    let bytes = raw.as_bytes();
    if bytes.len() == 10 && bytes[4] == b'-' && bytes[7] == b'-' {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    } else if bytes.len() == 10 && bytes[2] == b'-' && bytes[5] == b'-' {
        NaiveDate::parse_from_str(raw, "%d-%m-%Y").ok()
    } else {
        None
    }
}

/// Zone-independent check used when validating new sessions.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    normalize_class_date(raw, &Utc.fix())
}

/// The calendar date of `now` in the reference zone.
pub fn today_in(reference: &FixedOffset, now: Timestamp) -> NaiveDate {
    now.with_timezone(reference).date_naive()
}

/// Whether a stored class date falls on `today`. Unreadable dates never do.
pub fn is_on(raw: &str, today: NaiveDate, reference: &FixedOffset) -> bool {
    normalize_class_date(raw, reference) == Some(today)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
