//! Timestamp parsing and canonical formatting.
//!
//! Timestamps are persisted as fixed-width RFC 3339 UTC strings with
//! microsecond precision, so string order in SQLite equals time order.

use std::ops::RangeInclusive;

use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Utc};

/// Years that render as exactly four digits.
const YEAR_RANGE: RangeInclusive<i32> = 1..=9999;

/// Naive layouts accepted when the sender omits a UTC offset.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Render a timestamp in the canonical storage form.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a sender-supplied date-time.
///
/// RFC 3339 values keep their offset and are converted to UTC. Values without
/// an offset are read as UTC.
///
/// Only values that [`format_ts`] stores without loss are accepted: the UTC
/// year must be within 1..=9999 and the fraction must fit in microseconds.
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let ts = match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(_) => NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())?
            .and_utc(),
    };

    if !YEAR_RANGE.contains(&ts.year()) || ts.timestamp_subsec_nanos() % 1_000 != 0 {
        return None;
    }

    Some(ts)
}
