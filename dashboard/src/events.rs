use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const UNKNOWN_VALUE: &str = "Unknown";

/// One audit record as returned by the query API: column name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEvent(Map<String, Value>);

impl AuditEvent {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.get(TIMESTAMP_COLUMN).and_then(parse_timestamp)
    }

    /// Value of `field` as a chart category. Missing, null and empty values
    /// all become "Unknown".
    pub fn category(&self, field: &str) -> String {
        self.get(field)
            .and_then(value_text)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| UNKNOWN_VALUE.to_owned())
    }

    /// Cell text for the events table.
    pub fn display(&self, column: &str) -> String {
        self.get(column).and_then(value_text).unwrap_or_default()
    }
}

pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Parses a timestamp cell.
///
/// Strings may be RFC 3339, naive ISO date-times (read as UTC) or bare dates.
/// Numbers are epoch offsets whose unit is inferred from magnitude:
/// nanoseconds, microseconds, milliseconds or seconds.
///
/// Years outside 0000..=9999 are rejected so bucket labels keep sorting
/// in time order.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    parse_timestamp_any(value).filter(|ts| (0..=9999).contains(&ts.year()))
}

fn parse_timestamp_any(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => {
            let raw = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            let magnitude = raw.unsigned_abs();
            if magnitude >= 100_000_000_000_000_000 {
                Some(DateTime::from_timestamp_nanos(raw))
            } else if magnitude >= 100_000_000_000_000 {
                DateTime::from_timestamp_micros(raw)
            } else if magnitude >= 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}
