//! Wire and query-string timestamp formats, normalized to `Ms`.
//!
//! Bodies carry RFC 3339 (`2031-05-29T09:10:01Z`); any offset is accepted
//! and normalized to UTC. The room-list filter uses the fixed
//! `%y-%m-%d_%H:%M:%S` form (`31-05-29_09:10:01`), read as UTC.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::model::Ms;

const FILTER_FORMAT: &str = "%y-%m-%d_%H:%M:%S";

/// Parse an RFC 3339 timestamp from a request body.
pub fn parse_wire(value: &str) -> Option<Ms> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

/// Render a timestamp in the wire form, always UTC with a `Z` suffix.
pub fn format_wire(ms: Ms) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        None => ms.to_string(),
    }
}

/// Parse one availability-filter timestamp.
pub fn parse_filter(value: &str) -> Option<Ms> {
    NaiveDateTime::parse_from_str(value.trim(), FILTER_FORMAT)
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}
