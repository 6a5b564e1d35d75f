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

//! Grouping and aggregation.
//!
//! Records are partitioned into buckets by a list of slice conditions: a
//! bare field contributes its distinct values as a dimension, a
//! conditional slice contributes a matched/not-matched boolean. Each
//! bucket reduces to one synthetic entry whose numeric metrics carry
//! mean / min / max / sample count, governed by an absent-metrics
//! strategy.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::categorize::MetadataStats;
use crate::condition::Condition;
use crate::entry::{fetch_value, FieldMap, MetricsEntry};
use crate::value::{order_values, value_to_string};

/// Internal subfield on aggregated metrics counting contributions that
/// were genuinely recorded (not substituted). Consumed by the pruner and
/// stripped before responses leave the engine.
pub const N_GENUINE_KEY: &str = "n_genuine";

/// How to aggregate a metric that is present in some but not all records
/// of a bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentMetricsStrategy {
    /// Treat absent metrics as 0. For metrics that are simply not recorded
    /// when zero.
    Nullify,
    /// Reduce over the records that define the metric; `n_samples`
    /// reflects that subset.
    AcceptSubset,
    /// Emit the metric only when every record in the bucket defines it.
    #[default]
    AllOrNothing,
}

impl AbsentMetricsStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbsentMetricsStrategy::Nullify => "nullify",
            AbsentMetricsStrategy::AcceptSubset => "accept_subset",
            AbsentMetricsStrategy::AllOrNothing => "all_or_nothing",
        }
    }
}

impl std::str::FromStr for AbsentMetricsStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nullify" => Ok(Self::Nullify),
            "accept_subset" => Ok(Self::AcceptSubset),
            "all_or_nothing" => Ok(Self::AllOrNothing),
            other => Err(format!("unknown absent-metrics strategy `{other}`")),
        }
    }
}

/// One component of a bucket key. Keys order lexicographically so bucket
/// iteration (and therefore row order) is a pure function of the data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SliceKey {
    /// Bare-field slice on a record lacking the field.
    Missing,
    /// Conditional slice result.
    Flag(bool),
    /// Bare-field slice value (string form).
    Value(String),
}

impl SliceKey {
    fn display(&self) -> String {
        match self {
            SliceKey::Missing => "none".to_string(),
            SliceKey::Flag(b) => b.to_string(),
            SliceKey::Value(s) => s.clone(),
        }
    }
}

/// The bucket-key component of `entry` for each slice condition.
pub fn get_slice_values(entry: &MetricsEntry, slices: &[Condition]) -> Vec<SliceKey> {
    slices
        .iter()
        .map(|slice| {
            if slice.is_slice() {
                match entry.fetch_value(&slice.field_name) {
                    Some(v) if !v.is_null() => SliceKey::Value(value_to_string(v)),
                    _ => SliceKey::Missing,
                }
            } else {
                SliceKey::Flag(slice.check(entry.fetch_value(&slice.field_name)))
            }
        })
        .collect()
}

/// Partition `entries` into buckets keyed by their slice values, in
/// lexicographic key order. With no slices there is exactly one bucket
/// holding every entry.
pub fn partition_entries<'a>(
    entries: &'a [MetricsEntry],
    slices: &[Condition],
) -> BTreeMap<Vec<SliceKey>, Vec<&'a MetricsEntry>> {
    let mut buckets: BTreeMap<Vec<SliceKey>, Vec<&MetricsEntry>> = BTreeMap::new();
    for entry in entries {
        buckets
            .entry(get_slice_values(entry, slices))
            .or_default()
            .push(entry);
    }
    buckets
}

/// Aggregate `entries` into one synthetic entry per bucket.
///
/// `stats` supplies the metadata field categories that decide which
/// metadata fields get min/max/n_samples summaries.
pub fn aggregate_entries(
    entries: &[MetricsEntry],
    slices: &[Condition],
    stats: &MetadataStats,
    strategy: AbsentMetricsStrategy,
) -> Vec<MetricsEntry> {
    partition_entries(entries, slices)
        .into_iter()
        .map(|(key, bucket)| aggregate_bucket(&key, slices, &bucket, stats, strategy))
        .collect()
}

fn aggregate_bucket(
    key: &[SliceKey],
    slices: &[Condition],
    bucket: &[&MetricsEntry],
    stats: &MetadataStats,
    strategy: AbsentMetricsStrategy,
) -> MetricsEntry {
    let name = bucket_name(key, slices);
    let metadata = aggregate_metadata(bucket, stats);
    let metrics = aggregate_metrics(bucket, strategy);
    MetricsEntry::new(name, metadata, metrics)
}

/// Deterministic bucket name, usable as a directory name: slice values are
/// joined with `_` and path/condition characters are replaced.
fn bucket_name(key: &[SliceKey], slices: &[Condition]) -> String {
    if key.is_empty() {
        return "aggregated".to_string();
    }
    let parts: Vec<String> = slices
        .iter()
        .zip(key)
        .map(|(slice, k)| {
            let part = if slice.is_slice() {
                format!("{}_{}", slice.field_name, k.display())
            } else {
                let prefix = if matches!(k, SliceKey::Flag(true)) { "" } else { "not_" };
                format!("{prefix}{slice}")
            };
            part.replace(['/', ':', ' '], "_")
        })
        .collect();
    parts.join("_")
}

fn aggregate_metadata(bucket: &[&MetricsEntry], stats: &MetadataStats) -> FieldMap {
    let mut out = FieldMap::new();
    let field_names: BTreeSet<&str> = bucket
        .iter()
        .flat_map(|e| e.metadata.keys())
        .map(String::as_str)
        .filter(|k| *k != "files")
        .collect();

    for field_name in field_names {
        let first = bucket[0].metadata.get(field_name);
        let same_in_all = bucket.iter().all(|e| e.metadata.get(field_name) == first);
        if same_in_all {
            if let Some(v) = first {
                out.insert(field_name.to_string(), v.clone());
            }
        }

        if !stats.is_summarized(field_name) {
            continue;
        }
        if let Some(summary) = summarize_metadata_field(bucket, field_name) {
            match out.get_mut(field_name) {
                Some(Value::Object(existing)) => existing.extend(summary),
                _ => {
                    out.insert(field_name.to_string(), Value::Object(summary));
                }
            }
        }
    }
    out
}

/// Min/max/n_samples over the non-null values of a metadata field,
/// comparing chronologically for timestamps and numerically for numbers.
/// Carries the description of the first defining record, if any.
fn summarize_metadata_field(bucket: &[&MetricsEntry], field_name: &str) -> Option<FieldMap> {
    let mut min_value: Option<Value> = None;
    let mut max_value: Option<Value> = None;
    let mut n_samples = 0u64;
    let mut description: Option<Value> = None;

    for entry in bucket {
        if description.is_none() {
            if let Some(Value::Object(obj)) = entry.metadata.get(field_name) {
                description = obj.get("description").cloned();
            }
        }
        let Some(v) = fetch_value(&entry.metadata, field_name) else {
            continue;
        };
        if v.is_null() {
            continue;
        }
        n_samples += 1;
        match &min_value {
            Some(current) if order_values(v, current) != Ordering::Less => {}
            _ => min_value = Some(v.clone()),
        }
        match &max_value {
            Some(current) if order_values(v, current) != Ordering::Greater => {}
            _ => max_value = Some(v.clone()),
        }
    }

    let (min_value, max_value) = (min_value?, max_value?);
    let mut summary = FieldMap::new();
    if let Some(description) = description {
        summary.insert("description".to_string(), description);
    }
    summary.insert("min_value".to_string(), min_value);
    summary.insert("max_value".to_string(), max_value);
    summary.insert("n_samples".to_string(), json!(n_samples));
    Some(summary)
}

fn aggregate_metrics(bucket: &[&MetricsEntry], strategy: AbsentMetricsStrategy) -> FieldMap {
    let mut out = FieldMap::new();
    let metric_names: BTreeSet<&str> = bucket
        .iter()
        .flat_map(|e| e.metrics.keys())
        .map(String::as_str)
        .collect();

    for metric_name in metric_names {
        if let Some(cell) = reduce_metric(bucket, metric_name, strategy) {
            out.insert(metric_name.to_string(), Value::Object(cell));
        }
    }
    out
}

/// Numeric value of a metric field: a plain number, or the `value` member
/// of a metric object. A genuine zero is a real sample; only a missing or
/// non-numeric value counts as absent.
fn metric_number(entry: &MetricsEntry, metric_name: &str) -> Option<f64> {
    match entry.metrics.get(metric_name)? {
        Value::Object(obj) => obj.get("value")?.as_f64(),
        other => other.as_f64(),
    }
}

fn reduce_metric(
    bucket: &[&MetricsEntry],
    metric_name: &str,
    strategy: AbsentMetricsStrategy,
) -> Option<FieldMap> {
    let mut values: Vec<f64> = Vec::with_capacity(bucket.len());
    let mut n_genuine = 0u64;
    let mut template: Option<&FieldMap> = None;

    for entry in bucket {
        match metric_number(entry, metric_name) {
            Some(v) => {
                values.push(v);
                n_genuine += 1;
                if template.is_none() {
                    if let Some(Value::Object(obj)) = entry.metrics.get(metric_name) {
                        template = Some(obj);
                    }
                }
            }
            None => match strategy {
                AbsentMetricsStrategy::AllOrNothing => {
                    tracing::debug!(metric = metric_name, "absent in bucket, dropping metric");
                    return None;
                }
                AbsentMetricsStrategy::AcceptSubset => {}
                AbsentMetricsStrategy::Nullify => values.push(0.0),
            },
        }
    }

    if values.is_empty() || n_genuine == 0 {
        // A metric no record genuinely defines (e.g. a non-numeric shape
        // everywhere) produces no cell, whatever the strategy.
        return None;
    }

    let n = values.len();
    let total: f64 = values.iter().sum();
    let min_value = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max_value = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut cell = match template {
        Some(obj) => {
            let mut cell = obj.clone();
            // Reduction subfields from a previously aggregated entry must
            // not leak through.
            for k in ["min_value", "max_value", "n_samples", N_GENUINE_KEY] {
                cell.remove(k);
            }
            cell
        }
        None => FieldMap::new(),
    };
    cell.insert("value".to_string(), json!(total / n as f64));
    cell.insert("min_value".to_string(), json!(min_value));
    cell.insert("max_value".to_string(), json!(max_value));
    cell.insert("n_samples".to_string(), json!(n as u64));
    cell.insert(N_GENUINE_KEY.to_string(), json!(n_genuine));
    Some(cell)
}
