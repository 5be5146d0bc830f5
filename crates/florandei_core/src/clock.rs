//! Timestamp helpers shared by persistence, statistics and backups.
//!
//! Core stores instants as Unix epoch milliseconds; text forms are produced
//! only at the edges (backup files, CLI output).

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Current time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Renders epoch milliseconds as RFC 3339 UTC with millisecond precision,
/// e.g. `2024-05-01T12:00:00.000Z`.
pub fn to_rfc3339_ms(epoch_ms: i64) -> String {
    utc_from_epoch_ms(epoch_ms).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses any RFC 3339 timestamp into epoch milliseconds.
pub fn parse_rfc3339_ms(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|parsed| parsed.timestamp_millis())
}

/// UTC calendar month bucket, `YYYY-MM`.
pub fn month_key(epoch_ms: i64) -> String {
    utc_from_epoch_ms(epoch_ms).format("%Y-%m").to_string()
}

/// Day-first date (`dd/mm/yyyy`) in the given time zone.
pub fn format_date<Tz: TimeZone>(epoch_ms: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    utc_from_epoch_ms(epoch_ms)
        .with_timezone(tz)
        .format("%d/%m/%Y")
        .to_string()
}

/// Day-first date and time (`dd/mm/yyyy HH:MM:SS`) in the given time zone.
pub fn format_date_time<Tz: TimeZone>(epoch_ms: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    utc_from_epoch_ms(epoch_ms)
        .with_timezone(tz)
        .format("%d/%m/%Y %H:%M:%S")
        .to_string()
}

fn utc_from_epoch_ms(epoch_ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms).unwrap_or_default()
}
