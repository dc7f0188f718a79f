//! Utility functions shared by the schema, mapping and directory layers

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Formats a DateTime in the xsd:dateTime form used for SCIM values
///
/// Example output: "2025-06-14T10:03:54.374Z"
pub fn format_scim_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parses an xsd:dateTime string, accepting any RFC 3339 offset
pub fn parse_scim_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Formats a DateTime as directory generalized time with millisecond precision
///
/// Example output: "20250614100354.374Z"
pub fn format_generalized_time(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%d%H%M%S%.3fZ").to_string()
}

/// Parses directory generalized time (`YYYYMMDDHHMMSS[.fff]Z`)
pub fn parse_generalized_time(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    let body = trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z'))?;
    let parsed = if body.contains('.') || body.contains(',') {
        NaiveDateTime::parse_from_str(&body.replace(',', "."), "%Y%m%d%H%M%S%.f")
    } else {
        NaiveDateTime::parse_from_str(body, "%Y%m%d%H%M%S")
    };
    parsed.ok().map(|naive| Utc.from_utc_datetime(&naive))
}

/// Gets the current time formatted as generalized time
pub fn current_generalized_time() -> String {
    format_generalized_time(Utc::now())
}
