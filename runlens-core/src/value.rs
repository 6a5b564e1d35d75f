// Copyright 2025 Runlens Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Dynamic value handling.
//!
//! Metadata and metric values arrive as free-form JSON. The engine treats
//! them as a closed set of kinds — number, string, bool, timestamp-like
//! string, or opaque object — and every coercion the operators need lives
//! here, so the rest of the engine never does ad hoc type checks.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// The kind of a dynamic value as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Bool,
    Timestamp,
    String,
    Object,
    Null,
}

/// Classify a JSON value into the engine's closed kind set.
pub fn classify(value: &Value) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Bool,
        Value::Number(_) => ValueKind::Number,
        Value::String(s) => {
            if parse_timestamp_ms(s).is_some() {
                ValueKind::Timestamp
            } else {
                ValueKind::String
            }
        }
        Value::Array(_) | Value::Object(_) => ValueKind::Object,
    }
}

/// Numeric view of a value. Bools coerce to 0/1 so that range filters on
/// flag fields behave like the rest of the numeric comparisons.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// String form used for set membership, slice keys, and lexicographic
/// comparisons. Strings are used verbatim (no JSON quoting).
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a timestamp-like string to epoch milliseconds.
///
/// Accepts RFC 3339, naive ISO-8601 variants (seconds and sub-second
/// precision optional), bare dates, and 10/13-digit epoch strings. Naive
/// timestamps are interpreted as UTC.
pub fn parse_timestamp_ms(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        match s.len() {
            10 => return s.parse::<i64>().ok().map(|secs| secs * 1000),
            13 => return s.parse::<i64>().ok(),
            _ => {}
        }
    }
    None
}

/// Whether the value is a timestamp-like string.
pub fn is_timestamp_like(value: &Value) -> bool {
    matches!(value, Value::String(s) if parse_timestamp_ms(s).is_some())
}

/// Total order over dynamic values: numeric when both sides are numeric,
/// chronological when both are timestamp-like strings, lexicographic on
/// the string forms otherwise. Used by min/max reductions and row sorting.
pub fn order_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    if let (Value::String(sa), Value::String(sb)) = (a, b) {
        if let (Some(ta), Some(tb)) = (parse_timestamp_ms(sa), parse_timestamp_ms(sb)) {
            return ta.cmp(&tb);
        }
    }
    value_to_string(a).cmp(&value_to_string(b))
}
