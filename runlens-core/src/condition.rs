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

//! Filter predicate engine.
//!
//! Conditions are written as `field:operator:values` and double as filters
//! and slice specifications. A bare field name is a slice dimension
//! (group-by-distinct-value); `in` / `not_in` / `range` conditions filter
//! records, or act as binary partitions when used as slices.
//!
//! Range bounds may be parenthesized to allow embedded colons, which is how
//! ISO timestamps are written: `time_end_utc:range:(2025-05-23T11:48:26):`.

use std::fmt;

use serde::Serializer;
use serde_json::Value;

use crate::entry::MetricsEntry;
use crate::error::{Error, Result};
use crate::value::{as_number, parse_timestamp_ms, value_to_string};

/// Supported condition operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    /// Group by distinct field value. Not evaluable as a predicate.
    Slice,
    In,
    NotIn,
    Range,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Slice => "slice",
            ConditionOperator::In => "in",
            ConditionOperator::NotIn => "not_in",
            ConditionOperator::Range => "range",
        }
    }
}

/// Operand of a condition; the shape is fixed by the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValues {
    /// `slice` takes no operand.
    None,
    /// `in` / `not_in`: non-empty list of literals, compared by string
    /// equality (case-sensitive).
    Literals(Vec<String>),
    /// `range`: at least one bound present; both bounds are inclusive.
    Range {
        lower: Option<String>,
        upper: Option<String>,
    },
}

/// A condition for filtering or slicing records.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field_name: String,
    pub operator: ConditionOperator,
    pub values: ConditionValues,
}

impl Condition {
    pub fn slice(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            operator: ConditionOperator::Slice,
            values: ConditionValues::None,
        }
    }

    pub fn is_slice(&self) -> bool {
        self.operator == ConditionOperator::Slice
    }

    /// Evaluate the condition against a field value.
    ///
    /// A missing (or null) field never matches, whatever the operator:
    /// records lacking the field are excluded by filters, and do not belong
    /// to the matched side of a conditional slice.
    pub fn check(&self, field_value: Option<&Value>) -> bool {
        let value = match field_value {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };
        match (&self.operator, &self.values) {
            (ConditionOperator::In, ConditionValues::Literals(literals)) => {
                let s = value_to_string(value);
                literals.iter().any(|l| *l == s)
            }
            (ConditionOperator::NotIn, ConditionValues::Literals(literals)) => {
                let s = value_to_string(value);
                !literals.iter().any(|l| *l == s)
            }
            (ConditionOperator::Range, ConditionValues::Range { lower, upper }) => {
                check_range(value, lower.as_deref(), upper.as_deref())
            }
            // Slice conditions partition by value; they have no predicate.
            _ => false,
        }
    }
}

/// Inclusive range check with per-kind comparison dispatch: numeric when
/// the field value casts to a float, chronological when it is a
/// timestamp-like string, lexicographic otherwise. A bound that cannot be
/// parsed in the chosen domain never matches.
fn check_range(value: &Value, lower: Option<&str>, upper: Option<&str>) -> bool {
    if let Some(n) = numeric_cast(value) {
        let lower_ok = match lower {
            Some(bound) => match bound.parse::<f64>() {
                Ok(b) => n >= b,
                Err(_) => false,
            },
            None => true,
        };
        let upper_ok = match upper {
            Some(bound) => match bound.parse::<f64>() {
                Ok(b) => n <= b,
                Err(_) => false,
            },
            None => true,
        };
        return lower_ok && upper_ok;
    }

    if let Value::String(s) = value {
        if let Some(t) = parse_timestamp_ms(s) {
            let lower_ok = match lower {
                Some(bound) => matches!(parse_timestamp_ms(bound), Some(b) if t >= b),
                None => true,
            };
            let upper_ok = match upper {
                Some(bound) => matches!(parse_timestamp_ms(bound), Some(b) if t <= b),
                None => true,
            };
            return lower_ok && upper_ok;
        }
    }

    let s = value_to_string(value);
    let lower_ok = lower.map_or(true, |bound| s.as_str() >= bound);
    let upper_ok = upper.map_or(true, |bound| s.as_str() <= bound);
    lower_ok && upper_ok
}

/// Float view for range comparisons: numbers, bools, and numeric strings.
fn numeric_cast(value: &Value) -> Option<f64> {
    as_number(value).or_else(|| match value {
        Value::String(s) if parse_timestamp_ms(s).is_none() => s.parse::<f64>().ok(),
        _ => None,
    })
}

impl fmt::Display for Condition {
    /// Round-trippable form: `Display` output parses back to an equal
    /// condition. Range bounds containing colons are parenthesized.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.values {
            ConditionValues::None => write!(f, "{}", self.field_name),
            ConditionValues::Literals(literals) => write!(
                f,
                "{}:{}:{}",
                self.field_name,
                self.operator.as_str(),
                literals.join(",")
            ),
            ConditionValues::Range { lower, upper } => {
                let fmt_bound = |b: &Option<String>| match b {
                    Some(s) if s.contains(':') => format!("({s})"),
                    Some(s) => s.clone(),
                    None => String::new(),
                };
                write!(
                    f,
                    "{}:range:{}:{}",
                    self.field_name,
                    fmt_bound(lower),
                    fmt_bound(upper)
                )
            }
        }
    }
}

// Conditions appear in responses in their parseable string form.
impl serde::Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse a condition string into a list of conditions.
///
/// Multiple conditions may be separated with `;`:
/// `"model:not_in:gpt-3.5;author:in:user1,user2"`. A bare field name is a
/// slice condition.
pub fn parse_conditions(input: &str) -> Result<Vec<Condition>> {
    let mut conditions = Vec::new();
    for part in input.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        conditions.push(parse_single(part)?);
    }
    Ok(conditions)
}

/// Parse a list of condition strings, flattening `;`-separated entries.
pub fn parse_condition_list(inputs: &[String]) -> Result<Vec<Condition>> {
    let mut conditions = Vec::new();
    for input in inputs {
        conditions.extend(parse_conditions(input)?);
    }
    Ok(conditions)
}

/// Like [`parse_condition_list`] but reports failures as slice-syntax
/// errors.
pub fn parse_slice_list(inputs: &[String]) -> Result<Vec<Condition>> {
    parse_condition_list(inputs).map_err(Error::into_slice_error)
}

/// Parse condition strings destined for a filter position. A bare field
/// name is a slice, not a predicate; accepting one here would silently
/// exclude every record.
pub fn parse_filter_list(inputs: &[String]) -> Result<Vec<Condition>> {
    let conditions = parse_condition_list(inputs)?;
    if let Some(slice) = conditions.iter().find(|c| c.is_slice()) {
        return Err(Error::InvalidFilterSyntax {
            input: slice.field_name.clone(),
            reason: "filters require an operator (in, not_in, range)".to_string(),
        });
    }
    Ok(conditions)
}

fn parse_single(part: &str) -> Result<Condition> {
    let err = |reason: &str| Error::InvalidFilterSyntax {
        input: part.to_string(),
        reason: reason.to_string(),
    };

    let mut segments = part.splitn(3, ':');
    let field_name = segments.next().unwrap_or_default().trim();
    if field_name.is_empty() {
        return Err(err("empty field name"));
    }
    let Some(operator) = segments.next() else {
        return Ok(Condition::slice(field_name));
    };
    let values_str = segments.next().unwrap_or("").trim();

    match operator.trim() {
        "in" | "not_in" => {
            let literals: Vec<String> = values_str
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if literals.is_empty() {
                return Err(err("operator requires a non-empty value list"));
            }
            let operator = if operator.trim() == "in" {
                ConditionOperator::In
            } else {
                ConditionOperator::NotIn
            };
            Ok(Condition {
                field_name: field_name.to_string(),
                operator,
                values: ConditionValues::Literals(literals),
            })
        }
        "range" => {
            let (lower, upper) = parse_range_bounds(values_str, part)?;
            if lower.is_none() && upper.is_none() {
                return Err(err("range requires at least one bound"));
            }
            Ok(Condition {
                field_name: field_name.to_string(),
                operator: ConditionOperator::Range,
                values: ConditionValues::Range { lower, upper },
            })
        }
        other => Err(err(&format!("unknown operator `{other}`"))),
    }
}

/// Split `lower:upper` where either side may be empty (open bound) or
/// parenthesized to allow embedded colons.
fn parse_range_bounds(values: &str, context: &str) -> Result<(Option<String>, Option<String>)> {
    let (lower, rest) = take_bound(values, context)?;
    let upper = match rest {
        None => String::new(),
        Some(rest) => {
            let (upper, tail) = take_bound(rest, context)?;
            if tail.is_some_and(|t| !t.is_empty()) {
                return Err(Error::InvalidFilterSyntax {
                    input: context.to_string(),
                    reason: "range takes at most two bounds".to_string(),
                });
            }
            upper
        }
    };
    let to_opt = |s: String| if s.is_empty() { None } else { Some(s) };
    Ok((to_opt(lower), to_opt(upper)))
}

/// Consume one range bound; returns the bound text (parentheses stripped)
/// and the remainder after the delimiting colon, if any.
fn take_bound<'a>(s: &'a str, context: &str) -> Result<(String, Option<&'a str>)> {
    if let Some(inner) = s.strip_prefix('(') {
        let Some(close) = inner.find(')') else {
            return Err(Error::InvalidFilterSyntax {
                input: context.to_string(),
                reason: "unclosed parenthesis in range bound".to_string(),
            });
        };
        let bound = inner[..close].to_string();
        let rest = &inner[close + 1..];
        if rest.is_empty() {
            return Ok((bound, None));
        }
        let Some(rest) = rest.strip_prefix(':') else {
            return Err(Error::InvalidFilterSyntax {
                input: context.to_string(),
                reason: "expected `:` after parenthesized bound".to_string(),
            });
        };
        return Ok((bound, Some(rest)));
    }
    match s.split_once(':') {
        Some((bound, rest)) => Ok((bound.to_string(), Some(rest))),
        None => Ok((s.to_string(), None)),
    }
}

/// Whether `entry` satisfies every condition in `filters`.
pub fn check_filters_against_entry(entry: &MetricsEntry, filters: &[Condition]) -> bool {
    filters
        .iter()
        .all(|c| c.check(entry.fetch_value(&c.field_name)))
}

/// Keep only the entries that satisfy every filter.
pub fn filter_entries(entries: Vec<MetricsEntry>, filters: &[Condition]) -> Vec<MetricsEntry> {
    if filters.is_empty() {
        return entries;
    }
    entries
        .into_iter()
        .filter(|e| check_filters_against_entry(e, filters))
        .collect()
}
