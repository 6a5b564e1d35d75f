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

//! Metadata field statistics and categorization.
//!
//! A single pass over a record set produces per-field statistics
//! (cardinality, presence counts, a sample value) that several consumers
//! share: the aggregator decides which fields get min/max/n_samples
//! summaries, the recommendation engine draws its candidate pool, and
//! column-unit detection distinguishes timestamps from plain strings.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::entry::{fetch_value, MetricsEntry};
use crate::value::{as_number, is_timestamp_like, value_to_string};

/// How a metadata field behaves across the record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFieldCategory {
    /// All distinct values, timestamp-like: a per-run time marker.
    Timestamp,
    /// All distinct values, not timestamps: a per-run identifier.
    Unique,
    /// Repeated values (or present/absent split): usable as a grouping
    /// dimension.
    Group,
    /// One value everywhere it appears.
    Same,
}

/// Per-field statistics collected in one pass.
#[derive(Debug, Clone, Default)]
pub struct FieldStats {
    /// Entries in which the field key appears.
    pub present: usize,
    /// Entries in which the field resolves to a non-null value.
    pub non_null: usize,
    /// Distinct non-null values (by string form).
    pub distinct: usize,
    /// First non-null value observed (record order).
    pub first_value: Option<Value>,
}

/// Statistics and categories for every metadata field of a record set.
#[derive(Debug, Clone, Default)]
pub struct MetadataStats {
    pub record_count: usize,
    pub fields: BTreeMap<String, FieldStats>,
    categories: BTreeMap<String, MetadataFieldCategory>,
}

impl MetadataStats {
    pub fn category(&self, field_name: &str) -> Option<MetadataFieldCategory> {
        self.categories.get(field_name).copied()
    }

    /// Whether the field is aggregated to min/max/n_samples rather than
    /// carried through verbatim: timestamps always, unique fields when
    /// their values are numeric.
    pub fn is_summarized(&self, field_name: &str) -> bool {
        match self.category(field_name) {
            Some(MetadataFieldCategory::Timestamp) => true,
            Some(MetadataFieldCategory::Unique) => self
                .fields
                .get(field_name)
                .and_then(|s| s.first_value.as_ref())
                .is_some_and(|v| as_number(v).is_some()),
            _ => false,
        }
    }
}

/// Analyze metadata fields across `entries`. The `files` field is a log
/// attachment list, not an analytical dimension, and is skipped.
pub fn analyze_metadata(entries: &[MetricsEntry]) -> MetadataStats {
    let mut accs: BTreeMap<String, (FieldStats, BTreeSet<String>)> = BTreeMap::new();

    for entry in entries {
        for field_name in entry.metadata.keys() {
            if field_name == "files" {
                continue;
            }
            let (stats, distinct) = accs.entry(field_name.clone()).or_default();
            stats.present += 1;
            if let Some(v) = fetch_value(&entry.metadata, field_name) {
                if !v.is_null() {
                    stats.non_null += 1;
                    distinct.insert(value_to_string(v));
                    if stats.first_value.is_none() {
                        stats.first_value = Some(v.clone());
                    }
                }
            }
        }
    }

    let mut fields = BTreeMap::new();
    let mut categories = BTreeMap::new();
    for (field_name, (mut stats, distinct)) in accs {
        stats.distinct = distinct.len();
        categories.insert(field_name.clone(), categorize_field(&stats));
        fields.insert(field_name, stats);
    }

    MetadataStats {
        record_count: entries.len(),
        fields,
        categories,
    }
}

fn categorize_field(stats: &FieldStats) -> MetadataFieldCategory {
    if stats.non_null == 0 {
        return MetadataFieldCategory::Same;
    }
    if stats.distinct == 1 {
        return if stats.present == stats.non_null {
            MetadataFieldCategory::Same
        } else {
            // One value, sometimes null: present-vs-absent is a grouping.
            MetadataFieldCategory::Group
        };
    }
    if stats.distinct == stats.non_null {
        let timestampish = stats
            .first_value
            .as_ref()
            .is_some_and(is_timestamp_like);
        return if timestampish {
            MetadataFieldCategory::Timestamp
        } else {
            MetadataFieldCategory::Unique
        };
    }
    MetadataFieldCategory::Group
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries_from(rows: Vec<serde_json::Value>) -> Vec<MetricsEntry> {
        rows.into_iter()
            .map(|metadata| {
                serde_json::from_value(json!({"metadata": metadata, "metrics": {}})).unwrap()
            })
            .collect()
    }

    #[test]
    fn categorizes_fields() {
        let entries = entries_from(vec![
            json!({
                "agent_name": "navigator",
                "model": "m-1",
                "run_id": "a",
                "time_end_utc": "2025-05-23T11:48:26",
            }),
            json!({
                "agent_name": "navigator",
                "model": "m-2",
                "run_id": "b",
                "time_end_utc": "2025-05-23T12:48:26",
            }),
            json!({
                "agent_name": "navigator",
                "model": "m-1",
                "run_id": "c",
                "time_end_utc": "2025-05-23T13:48:26",
            }),
        ]);
        let stats = analyze_metadata(&entries);
        assert_eq!(stats.category("agent_name"), Some(MetadataFieldCategory::Same));
        assert_eq!(stats.category("model"), Some(MetadataFieldCategory::Group));
        assert_eq!(stats.category("run_id"), Some(MetadataFieldCategory::Unique));
        assert_eq!(
            stats.category("time_end_utc"),
            Some(MetadataFieldCategory::Timestamp)
        );
        assert_eq!(stats.category("missing"), None);
    }

    #[test]
    fn null_split_is_group() {
        let entries = entries_from(vec![
            json!({"flag": "on"}),
            json!({"flag": null}),
        ]);
        let stats = analyze_metadata(&entries);
        assert_eq!(stats.category("flag"), Some(MetadataFieldCategory::Group));
    }

    #[test]
    fn unique_numeric_is_summarized() {
        let entries = entries_from(vec![
            json!({"seq": 1, "tag": "x"}),
            json!({"seq": 2, "tag": "y"}),
        ]);
        let stats = analyze_metadata(&entries);
        assert_eq!(stats.category("seq"), Some(MetadataFieldCategory::Unique));
        assert!(stats.is_summarized("seq"));
        // Unique but non-numeric: carried through, not summarized.
        assert!(!stats.is_summarized("tag"));
    }

    #[test]
    fn files_is_not_a_dimension() {
        let entries = entries_from(vec![json!({"files": [{"filename": "log.txt"}]})]);
        let stats = analyze_metadata(&entries);
        assert_eq!(stats.category("files"), None);
    }

    #[test]
    fn wrapped_values_use_inner_value() {
        let entries = entries_from(vec![
            json!({"model": {"value": "m-1", "description": "model id"}}),
            json!({"model": {"value": "m-1"}}),
        ]);
        let stats = analyze_metadata(&entries);
        assert_eq!(stats.category("model"), Some(MetadataFieldCategory::Same));
    }
}
