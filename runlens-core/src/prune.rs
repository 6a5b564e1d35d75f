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

//! Heuristic removal of uninformative metrics from aggregated entries.
//!
//! A metric is judged meaningless over a scope when either
//! 1. every value in scope is zero and none of them was genuinely
//!    recorded (all were absent-metric substitutions), or
//! 2. the value is identical in every row of the scope, so the column has
//!    no discriminative power.
//! The first test takes precedence; the second needs at least two rows.
//!
//! `Column` mode applies both tests across the whole table and removes
//! whole columns. `All` mode removes per entry (intended for individual
//! log display, where uniform column removal is not required) and applies
//! only the first test. Metrics the caller selected explicitly (by exact
//! leaf path, not a subtree wildcard) are never pruned.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::N_GENUINE_KEY;
use crate::entry::MetricsEntry;

/// Prune mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneMode {
    None,
    /// Per-entry pruning, for individual log display.
    All,
    /// Uniform column pruning across the whole table.
    #[default]
    Column,
}

impl PruneMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PruneMode::None => "none",
            PruneMode::All => "all",
            PruneMode::Column => "column",
        }
    }
}

impl std::str::FromStr for PruneMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "all" => Ok(Self::All),
            "column" => Ok(Self::Column),
            other => Err(format!("unknown prune mode `{other}`")),
        }
    }
}

/// Remove meaningless metrics from `entries` in place. `protected` holds
/// metric names (without the `/metrics/` prefix) that were selected
/// explicitly and are therefore exempt.
pub fn prune_entries(entries: &mut [MetricsEntry], mode: PruneMode, protected: &BTreeSet<String>) {
    match mode {
        PruneMode::None => {}
        PruneMode::All => {
            for entry in entries.iter_mut() {
                entry.metrics.retain(|name, value| {
                    protected.contains(name) || !zero_and_never_genuine(&[&*value])
                });
            }
        }
        PruneMode::Column => {
            let meaningless = meaningless_columns(entries, protected);
            if meaningless.is_empty() {
                return;
            }
            tracing::debug!(columns = ?meaningless, "pruning uninformative columns");
            for entry in entries.iter_mut() {
                entry.metrics.retain(|name, _| !meaningless.contains(name));
            }
        }
    }
}

fn meaningless_columns(entries: &[MetricsEntry], protected: &BTreeSet<String>) -> BTreeSet<String> {
    let mut by_column: BTreeMap<&str, Vec<&Value>> = BTreeMap::new();
    for entry in entries {
        for (name, value) in &entry.metrics {
            by_column.entry(name.as_str()).or_default().push(value);
        }
    }

    let mut out = BTreeSet::new();
    for (name, values) in by_column {
        if protected.contains(name) {
            continue;
        }
        if zero_and_never_genuine(&values) || constant_across(entries.len(), &values) {
            out.insert(name.to_string());
        }
    }
    out
}

/// Every value is exactly zero and no contribution was genuine.
fn zero_and_never_genuine(values: &[&Value]) -> bool {
    values.iter().all(|v| {
        metric_value(v).and_then(Value::as_f64) == Some(0.0) && genuine_count(v) == Some(0)
    })
}

/// Present in every row with an identical value; needs at least two rows
/// to say anything about discriminative power.
fn constant_across(row_count: usize, values: &[&Value]) -> bool {
    if row_count < 2 || values.len() < row_count {
        return false;
    }
    let first = metric_value(values[0]);
    values.iter().all(|v| metric_value(v) == first)
}

fn metric_value<'a>(v: &'a Value) -> Option<&'a Value> {
    match v {
        Value::Object(obj) => obj.get("value"),
        other => Some(other),
    }
}

fn genuine_count(v: &Value) -> Option<u64> {
    match v {
        Value::Object(obj) => obj.get(N_GENUINE_KEY).and_then(Value::as_u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry_with(metrics: Value) -> MetricsEntry {
        serde_json::from_value(json!({"metadata": {}, "metrics": metrics})).unwrap()
    }

    fn aggr_metric(value: f64, n_genuine: u64) -> Value {
        json!({"value": value, "min_value": value, "max_value": value, "n_samples": 3, "n_genuine": n_genuine})
    }

    #[test]
    fn column_mode_drops_nullify_only_zero_column() {
        let mut entries = vec![
            entry_with(json!({"lat": aggr_metric(1.0, 3), "ghost": aggr_metric(0.0, 0)})),
            entry_with(json!({"lat": aggr_metric(2.0, 3), "ghost": aggr_metric(0.0, 0)})),
        ];
        prune_entries(&mut entries, PruneMode::Column, &BTreeSet::new());
        assert!(entries.iter().all(|e| !e.metrics.contains_key("ghost")));
        assert!(entries.iter().all(|e| e.metrics.contains_key("lat")));
    }

    #[test]
    fn genuine_zero_column_survives_zero_test_but_not_constant_test() {
        // All-zero but genuinely recorded: removed only because it is
        // constant across rows.
        let mut entries = vec![
            entry_with(json!({"errors": aggr_metric(0.0, 3), "lat": aggr_metric(1.0, 3)})),
            entry_with(json!({"errors": aggr_metric(0.0, 2), "lat": aggr_metric(2.0, 2)})),
        ];
        prune_entries(&mut entries, PruneMode::Column, &BTreeSet::new());
        assert!(entries.iter().all(|e| !e.metrics.contains_key("errors")));

        // In a single-row table the constant test does not apply.
        let mut single = vec![entry_with(json!({"errors": aggr_metric(0.0, 3)}))];
        prune_entries(&mut single, PruneMode::Column, &BTreeSet::new());
        assert!(single[0].metrics.contains_key("errors"));
    }

    #[test]
    fn column_missing_in_some_rows_is_not_constant() {
        let mut entries = vec![
            entry_with(json!({"lat": aggr_metric(5.0, 3)})),
            entry_with(json!({})),
        ];
        prune_entries(&mut entries, PruneMode::Column, &BTreeSet::new());
        assert!(entries[0].metrics.contains_key("lat"));
    }

    #[test]
    fn explicit_selection_is_never_pruned() {
        let protected: BTreeSet<String> = [String::from("ghost")].into();
        let mut entries = vec![
            entry_with(json!({"ghost": aggr_metric(0.0, 0)})),
            entry_with(json!({"ghost": aggr_metric(0.0, 0)})),
        ];
        prune_entries(&mut entries, PruneMode::Column, &protected);
        assert!(entries.iter().all(|e| e.metrics.contains_key("ghost")));
    }

    #[test]
    fn all_mode_prunes_per_entry() {
        let mut entries = vec![
            entry_with(json!({"lat": aggr_metric(0.0, 0), "calls": aggr_metric(4.0, 2)})),
            entry_with(json!({"lat": aggr_metric(3.0, 2)})),
        ];
        prune_entries(&mut entries, PruneMode::All, &BTreeSet::new());
        assert!(!entries[0].metrics.contains_key("lat"));
        assert!(entries[0].metrics.contains_key("calls"));
        // The same column survives in the row where it carries data.
        assert!(entries[1].metrics.contains_key("lat"));
    }

    #[test]
    fn raw_entries_are_untouched_by_all_mode() {
        let mut entries = vec![entry_with(json!({"errors": {"value": 0.0}}))];
        prune_entries(&mut entries, PruneMode::All, &BTreeSet::new());
        assert!(entries[0].metrics.contains_key("errors"));
    }

    #[test]
    fn column_pruning_is_idempotent() {
        let mut entries = vec![
            entry_with(json!({
                "lat": aggr_metric(1.0, 3),
                "ghost": aggr_metric(0.0, 0),
                "flat": aggr_metric(9.0, 3),
            })),
            entry_with(json!({
                "lat": aggr_metric(2.0, 3),
                "ghost": aggr_metric(0.0, 0),
                "flat": aggr_metric(9.0, 3),
            })),
        ];
        prune_entries(&mut entries, PruneMode::Column, &BTreeSet::new());
        let once = entries.clone();
        prune_entries(&mut entries, PruneMode::Column, &BTreeSet::new());
        assert_eq!(once, entries);
        assert!(entries.iter().all(|e| !e.metrics.contains_key("ghost")));
        assert!(entries.iter().all(|e| !e.metrics.contains_key("flat")));
        assert!(entries.iter().all(|e| e.metrics.contains_key("lat")));
    }
}
