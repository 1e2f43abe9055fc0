//! India Standard Time helpers.
//!
//! Scheduled runs and challenges are entered and shown in IST (UTC+05:30)
//! regardless of the runner's device timezone. Form inputs use the
//! `YYYY-MM-DDTHH:mm` local shape.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use log::warn;

const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;
const IST_SUFFIX: &str = "+05:30";

/// The IST offset.
pub fn ist() -> FixedOffset {
    // Constant offset well inside the valid range
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// `2024-01-15T14:30` (read as IST) -> `2024-01-15T14:30:00+05:30`.
///
/// A missing time part means midnight. Returns `None` for empty or
/// malformed input.
pub fn convert_local_to_ist(date_time_local: &str) -> Option<String> {
    let input = date_time_local.trim();
    if input.is_empty() {
        return None;
    }

    let (date_part, time_part) = input.split_once('T').unwrap_or((input, "00:00"));
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    let time = parse_hours_minutes(time_part)?;

    Some(format!(
        "{}T{}:00{}",
        date.format("%Y-%m-%d"),
        time.format("%H:%M"),
        IST_SUFFIX
    ))
}

/// ISO string -> `YYYY-MM-DDTHH:mm` in IST, for prefilling form inputs.
///
/// Only `Z` strings are shifted (by +5:30). Every other string keeps its
/// wall time: `+05:30` is already IST, and any other offset is dropped
/// because stored schedule times are IST wall times whatever suffix the
/// server attached. Returns an empty string when the input cannot be read.
pub fn convert_ist_to_local(iso: &str) -> String {
    let input = iso.trim();
    if input.is_empty() {
        return String::new();
    }
    let parsed = if input.ends_with('Z') {
        parse_iso(input)
    } else {
        parse_naive(strip_offset(input)).and_then(|naive| ist().from_local_datetime(&naive).single())
    };
    match parsed {
        Some(parsed) => parsed.format("%Y-%m-%dT%H:%M").to_string(),
        None => {
            warn!("[dates] Cannot convert '{}' to local input format", iso);
            String::new()
        }
    }
}

/// ISO string -> `DD/MM/YYYY, HH:mm` in IST. Unlike
/// [`convert_ist_to_local`], any explicit offset is honoured and converted.
/// Strings without one are read as IST. Unreadable input is returned
/// unchanged.
pub fn format_date_ist(iso: &str) -> String {
    if iso.trim().is_empty() {
        return String::new();
    }
    match parse_iso(iso) {
        Some(parsed) => parsed.format("%d/%m/%Y, %H:%M").to_string(),
        None => {
            warn!("[dates] Cannot format '{}' as IST", iso);
            iso.to_string()
        }
    }
}

/// Parse any of the ISO shapes the API emits, as IST.
pub fn parse_iso(iso: &str) -> Option<DateTime<FixedOffset>> {
    let input = iso.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(parsed.with_timezone(&ist()));
    }

    let (body, offset) = if let Some(body) = input.strip_suffix('Z') {
        (body, Some(Utc.fix()))
    } else if let Some(body) = input.strip_suffix(IST_SUFFIX) {
        (body, Some(ist()))
    } else {
        (input, None)
    };

    let naive = parse_naive(body)?;
    match offset {
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&ist())),
        None => ist().from_local_datetime(&naive).single(),
    }
}

/// Drop a trailing `+HH:MM` / `-HH:MM` from a date-time string.
fn strip_offset(input: &str) -> &str {
    let bytes = input.as_bytes();
    let n = bytes.len();
    if input.contains('T') && n >= 6 && matches!(bytes[n - 6], b'+' | b'-') && bytes[n - 3] == b':' {
        &input[..n - 6]
    } else {
        input
    }
}

fn parse_naive(body: &str) -> Option<NaiveDateTime> {
    // Drop fractional seconds
    let body = body.split('.').next().unwrap_or(body);
    match body.split_once('T') {
        Some((date, time)) => {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
            Some(date.and_time(parse_hours_minutes(time)?))
        }
        None => NaiveDate::parse_from_str(body, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
    }
}

/// `HH:mm` or `HH:mm:ss`; seconds are discarded.
fn parse_hours_minutes(time: &str) -> Option<NaiveTime> {
    let mut parts = time.split(':');
    let hours: u32 = parts.next()?.trim().parse().ok()?;
    let minutes: u32 = parts.next().unwrap_or("0").trim().parse().ok()?;
    NaiveTime::from_hms_opt(hours, minutes, 0)
}
