//! Timestamp helpers shared by storage and CSV projection.
//!
//! Timestamps are UTC with microsecond precision and persist as fixed-width
//! RFC 3339 text, so lexical order equals chronological order.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Current UTC time truncated to storage precision.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Formats a timestamp in its persisted/exported text form.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses persisted timestamp text.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
