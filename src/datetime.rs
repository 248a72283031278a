//! Timestamp storage helpers.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC text
//! (`2025-01-01T00:00:00.000000Z`), so string comparison in SQL matches
//! chronological order. Eligibility queries rely on this.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 and the SQLite `datetime('now')` format.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}
