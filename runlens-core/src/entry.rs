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

//! The canonical per-run record: free-form metadata plus a flat map of
//! metric paths. Records are immutable inputs to every query; the only
//! mutation helpers here (`flatten_values`, `remove_subfields`) shape
//! aggregated copies for the response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field-name keyed map of dynamic values. Keys iterate in sorted order.
pub type FieldMap = serde_json::Map<String, Value>;

/// A log file attached to a run, referenced from `metadata.files`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogFile {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One agent run's metrics payload.
///
/// `metrics` keys are `/`-separated paths of arbitrary depth; each value is
/// either a plain number or an object carrying `value` plus descriptive
/// subfields. Aggregated entries produced by the engine reuse the same
/// shape with `min_value` / `max_value` / `n_samples` subfields added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: FieldMap,
    #[serde(default)]
    pub metrics: FieldMap,
    /// Not loaded by default; populated by the storage collaborator only
    /// when the logs path actually needs file contents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_files: Vec<LogFile>,
}

impl MetricsEntry {
    pub fn new(name: impl Into<String>, metadata: FieldMap, metrics: FieldMap) -> Self {
        Self {
            name: name.into(),
            metadata,
            metrics,
            log_files: Vec::new(),
        }
    }

    /// Fetch the value for `field_name`, looking in metadata first, then
    /// metrics. See [`fetch_value`] for path resolution rules.
    pub fn fetch_value(&self, field_name: &str) -> Option<&Value> {
        fetch_value(&self.metadata, field_name).or_else(|| fetch_value(&self.metrics, field_name))
    }

    /// Collapse `{"value": x}`-only objects down to `x` in both maps.
    pub fn flatten_values(&mut self) {
        flatten_values(&mut self.metadata);
        flatten_values(&mut self.metrics);
    }

    /// Strip internal subfields from every object-valued field.
    pub fn remove_subfields(&mut self, subfields: &[&str]) {
        remove_subfields(&mut self.metadata, subfields);
        remove_subfields(&mut self.metrics, subfields);
    }
}

/// Fetch `field_name` from `data`.
///
/// A direct hit on an object value yields its `value` member (fields are
/// stored as `{value, description, ...}` objects). When the direct lookup
/// misses and the name contains a separator, the last segment is treated
/// as a subfield of the parent object — this is how `foo/max_value`
/// reaches into an aggregated field.
pub fn fetch_value<'a>(data: &'a FieldMap, field_name: &str) -> Option<&'a Value> {
    if let Some(v) = data.get(field_name) {
        if let Value::Object(obj) = v {
            return obj.get("value");
        }
        return Some(v);
    }
    if let Some((parent, subfield)) = field_name.rsplit_once('/') {
        if let Some(Value::Object(obj)) = data.get(parent) {
            return obj.get(subfield);
        }
    }
    None
}

/// Strip a trailing reduction sub-selector (`/n_samples`, `/min_value`,
/// `/max_value`) from a field reference, yielding the field it reaches
/// into.
pub fn extract_base_field_name(field_name: &str) -> &str {
    for subfield in ["/n_samples", "/min_value", "/max_value"] {
        if let Some(base) = field_name.strip_suffix(subfield) {
            return base;
        }
    }
    field_name
}

/// If a field value is an object containing only a `value` member, replace
/// it with that member.
pub fn flatten_values(fields: &mut FieldMap) {
    for (_, v) in fields.iter_mut() {
        let flattened = match v {
            Value::Object(obj) if obj.len() == 1 => obj.get("value").cloned(),
            _ => None,
        };
        if let Some(inner) = flattened {
            *v = inner;
        }
    }
}

/// Remove `subfields` from every object-valued field in `fields`.
pub fn remove_subfields(fields: &mut FieldMap, subfields: &[&str]) {
    for (_, v) in fields.iter_mut() {
        if let Value::Object(obj) = v {
            for subfield in subfields {
                obj.remove(*subfield);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> MetricsEntry {
        serde_json::from_value(json!({
            "name": "run-1",
            "metadata": {
                "agent_name": "navigator",
                "time_end_utc": {"value": "2025-05-23T11:48:26", "description": "finish time"},
            },
            "metrics": {
                "api_calls/count": {"value": 7.0, "description": "api calls"},
                "latency_s": 1.5,
            }
        }))
        .unwrap()
    }

    #[test]
    fn fetch_plain_and_wrapped() {
        let e = entry();
        assert_eq!(e.fetch_value("agent_name"), Some(&json!("navigator")));
        assert_eq!(
            e.fetch_value("time_end_utc"),
            Some(&json!("2025-05-23T11:48:26"))
        );
        assert_eq!(e.fetch_value("api_calls/count"), Some(&json!(7.0)));
        assert_eq!(e.fetch_value("latency_s"), Some(&json!(1.5)));
        assert_eq!(e.fetch_value("missing"), None);
    }

    #[test]
    fn fetch_subfield_of_parent_object() {
        let mut e = entry();
        e.metadata.insert(
            "time_end_utc".into(),
            json!({"value": "2025-05-23T11:48:26", "max_value": "2025-05-24T00:00:00", "n_samples": 3}),
        );
        assert_eq!(
            e.fetch_value("time_end_utc/max_value"),
            Some(&json!("2025-05-24T00:00:00"))
        );
        assert_eq!(e.fetch_value("time_end_utc/n_samples"), Some(&json!(3)));
    }

    #[test]
    fn flatten_only_value_objects() {
        let mut e = entry();
        e.metrics
            .insert("solo".into(), json!({"value": 2.0}));
        e.flatten_values();
        assert_eq!(e.metrics.get("solo"), Some(&json!(2.0)));
        // Objects with more members keep their shape.
        assert!(e.metrics.get("api_calls/count").unwrap().is_object());
    }

    #[test]
    fn strip_subfields() {
        let mut e = entry();
        e.remove_subfields(&["description"]);
        assert_eq!(
            e.metrics.get("api_calls/count"),
            Some(&json!({"value": 7.0}))
        );
    }
}
