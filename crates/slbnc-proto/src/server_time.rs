//! IRCv3 `server-time` tag formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp the way the `time` tag carries it
/// (`YYYY-MM-DDThh:mm:ss.sssZ`).
pub fn format_server_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in `time` tag format.
pub fn now() -> String {
    format_server_time(Utc::now())
}

/// Parse a `time` tag value. Returns `None` when it is not RFC 3339.
pub fn parse_server_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
