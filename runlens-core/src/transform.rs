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

//! Top-level orchestration: compose filtering, grouping, aggregation,
//! pruning, and recommendations into the table and logs responses.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use serde_json::Value;

use crate::aggregate::{
    aggregate_entries, partition_entries, AbsentMetricsStrategy, N_GENUINE_KEY,
};
use crate::categorize::{analyze_metadata, MetadataFieldCategory, MetadataStats};
use crate::column_tree::{build_column_tree, TableColumn, TableColumnUnit};
use crate::condition::{
    filter_entries, parse_condition_list, parse_filter_list, parse_slice_list, Condition,
    ConditionOperator,
};
use crate::entry::{extract_base_field_name, MetricsEntry};
use crate::error::Result;
use crate::grouped::{GroupedMetrics, GroupedMetricsList};
use crate::moving::DEFAULT_TIME_FIELD;
use crate::prune::{prune_entries, PruneMode};
use crate::recommend::{recommend_groups, GroupsRecommendationStrategy};
use crate::table::{SortOrder, Table, TableCell};
use crate::value::{as_number, value_to_string};

/// Parameters for building an aggregation table.
#[derive(Debug, Clone, Default)]
pub struct TableParams {
    pub filters: Vec<String>,
    pub slices: Vec<String>,
    /// Ids of columns or column subtrees to show.
    pub column_selections: Vec<String>,
    pub sort_by: Option<(String, SortOrder)>,
    pub prune_mode: PruneMode,
    pub absent_metrics_strategy: AbsentMetricsStrategy,
    pub slices_recommendation_strategy: GroupsRecommendationStrategy,
}

/// Aggregate `entries` into a table.
///
/// `column_selections_to_add` / `_to_remove` apply after the base
/// selection, removals last, so a removal wins for any leaf both touch.
pub fn create_table(
    entries: Vec<MetricsEntry>,
    params: &TableParams,
    column_selections_to_add: &[String],
    column_selections_to_remove: &[String],
) -> Result<Table> {
    let filters = parse_filter_list(&params.filters)?;
    let slices = parse_slice_list(&params.slices)?;

    let mut entries = filter_entries(entries, &filters);
    sort_by_timestamp_desc(&mut entries, DEFAULT_TIME_FIELD);
    let stats = analyze_metadata(&entries);

    let mut aggregated =
        aggregate_entries(&entries, &slices, &stats, params.absent_metrics_strategy);

    let protected = protected_metric_names(
        params
            .column_selections
            .iter()
            .chain(column_selections_to_add),
    );
    prune_entries(&mut aggregated, params.prune_mode, &protected);

    let mut column_tree = build_column_tree(&aggregated);
    column_tree.add_selection(&params.column_selections);
    column_tree.add_selection(column_selections_to_add);
    column_tree.remove_selection(column_selections_to_remove);

    let mut columns = column_tree.get_selection();
    for column in &mut columns {
        column.unit = Some(determine_column_unit(&column.name, &aggregated, &stats));
    }

    let slice_recommendations = {
        let mut current = slices.clone();
        current.extend(filters.iter().cloned());
        recommend_groups(&stats, &current, params.slices_recommendation_strategy)
    };

    let mut rows = Vec::with_capacity(aggregated.len() + 1);
    rows.push(header_row(&columns));
    for entry in &aggregated {
        rows.push(build_row(entry, &columns, &stats));
    }

    let mut table = Table {
        rows,
        column_tree,
        columns,
        filters,
        slices,
        slice_recommendations,
        sorted_by: None,
    };
    if let Some((column_id, sort_order)) = &params.sort_by {
        table.sort_rows(column_id, *sort_order)?;
    }

    table.remove_subfields(&[N_GENUINE_KEY]);
    table.flatten_values();
    Ok(table)
}

fn header_row(columns: &[TableColumn]) -> Vec<TableCell> {
    let mut header = vec![TableCell::default()];
    for column in columns {
        let mut cell = TableCell::default();
        cell.values
            .insert("value".to_string(), Value::String(column.name.clone()));
        cell.details
            .insert("name".to_string(), Value::String(column.name.clone()));
        cell.details.insert(
            "description".to_string(),
            column
                .description
                .clone()
                .map_or(Value::Null, Value::String),
        );
        header.push(cell);
    }
    header
}

fn build_row(entry: &MetricsEntry, columns: &[TableColumn], stats: &MetadataStats) -> Vec<TableCell> {
    // Row-name cell: grouping fields up front, everything else available
    // in the tooltip.
    let mut key_cell = TableCell::default();
    for (k, v) in &entry.metadata {
        if stats.category(k) == Some(MetadataFieldCategory::Group) {
            key_cell.values.insert(k.clone(), v.clone());
        }
        key_cell.details.insert(k.clone(), v.clone());
    }

    let mut row = Vec::with_capacity(columns.len() + 1);
    row.push(key_cell);
    for column in columns {
        row.push(build_cell(entry, &column.name));
    }
    row
}

fn build_cell(entry: &MetricsEntry, column_name: &str) -> TableCell {
    let mut cell = TableCell::default();
    let direct = entry
        .metadata
        .get(column_name)
        .or_else(|| entry.metrics.get(column_name));
    // Fall back to sub-selector resolution (`foo/max_value`).
    let value = direct.or_else(|| entry.fetch_value(column_name));
    let Some(value) = value else {
        return cell;
    };
    match value {
        Value::Object(obj) => {
            for field in ["value", "min_value", "max_value"] {
                if let Some(v) = obj.get(field) {
                    cell.values.insert(field.to_string(), v.clone());
                }
            }
            cell.details = obj.clone();
            cell.details
                .insert("name".to_string(), Value::String(column_name.to_string()));
        }
        scalar => {
            cell.values.insert("value".to_string(), scalar.clone());
            cell.details.insert("value".to_string(), scalar.clone());
        }
    }
    cell
}

/// Column unit for display: timestamp fields (and their min/max
/// sub-selectors) first, then numeric vs string by the first value found.
pub fn determine_column_unit(
    column_name: &str,
    entries: &[MetricsEntry],
    stats: &MetadataStats,
) -> TableColumnUnit {
    let timestamp = stats.category(column_name) == Some(MetadataFieldCategory::Timestamp)
        || matches!(
            column_name.rsplit_once('/'),
            Some((parent, sub))
                if (sub == "min_value" || sub == "max_value")
                    && stats.category(parent) == Some(MetadataFieldCategory::Timestamp)
        );
    if timestamp {
        return TableColumnUnit::Timestamp;
    }
    for entry in entries {
        if let Some(v) = entry.fetch_value(column_name) {
            if v.is_null() {
                continue;
            }
            return if as_number(v).is_some() {
                TableColumnUnit::Numerical
            } else {
                TableColumnUnit::String
            };
        }
    }
    TableColumnUnit::String
}

/// Metric names selected by exact leaf path; these are exempt from
/// pruning. Subtree selections (ids ending in `/`) stay prunable.
fn protected_metric_names<'a, I>(selections: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    selections
        .into_iter()
        .filter(|s| !s.ends_with('/'))
        .filter_map(|s| s.strip_prefix("/metrics/"))
        .map(|name| extract_base_field_name(name).to_string())
        .collect()
}

/// Newest first; entries without the timestamp field go last.
fn sort_by_timestamp_desc(entries: &mut [MetricsEntry], field_name: &str) {
    entries.sort_by_cached_key(|e| {
        Reverse(
            e.fetch_value(field_name)
                .map(value_to_string)
                .unwrap_or_default(),
        )
    });
}

/// Parameters for the grouped logs listing.
#[derive(Debug, Clone)]
pub struct LogsParams {
    pub filters: Vec<String>,
    pub groups: Vec<String>,
    pub prune_mode: PruneMode,
    pub groups_recommendation_strategy: GroupsRecommendationStrategy,
}

impl Default for LogsParams {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            groups: Vec::new(),
            // Per-entry pruning suits individual log display.
            prune_mode: PruneMode::All,
            groups_recommendation_strategy: GroupsRecommendationStrategy::default(),
        }
    }
}

/// Group `entries` for the logs listing: one aggregate summary per group
/// plus the group's runs, groups ordered newest first.
pub fn create_logs_list(entries: Vec<MetricsEntry>, params: &LogsParams) -> Result<GroupedMetricsList> {
    let filters = parse_filter_list(&params.filters)?;
    let groups = parse_slice_list(&params.groups)?;

    let mut entries = filter_entries(entries, &filters);
    sort_by_timestamp_desc(&mut entries, DEFAULT_TIME_FIELD);
    let stats = analyze_metadata(&entries);

    let mut grouped: Vec<GroupedMetrics> = Vec::new();
    for (_, bucket) in partition_entries(&entries, &groups) {
        let mut bucket: Vec<MetricsEntry> = bucket.into_iter().cloned().collect();

        // Every entry in the bucket shares one group key, so this yields
        // exactly one aggregate, named after the key.
        let mut aggregated =
            aggregate_entries(&bucket, &groups, &stats, AbsentMetricsStrategy::AllOrNothing);
        prune_entries(&mut aggregated, params.prune_mode, &BTreeSet::new());
        let mut aggr_entry = aggregated.pop().unwrap_or_default();

        prune_entries(&mut bucket, params.prune_mode, &BTreeSet::new());

        aggr_entry.remove_subfields(&[N_GENUINE_KEY]);
        aggr_entry.flatten_values();
        for entry in &mut bucket {
            entry.remove_subfields(&[N_GENUINE_KEY]);
            entry.flatten_values();
        }
        grouped.push(GroupedMetrics {
            aggr_entry,
            entries: bucket,
        });
    }

    grouped.sort_by_cached_key(|g| {
        Reverse(
            g.aggr_entry
                .fetch_value("time_end_utc/max_value")
                .map(value_to_string)
                .unwrap_or_default(),
        )
    });

    let group_recommendations = {
        let mut current = groups.clone();
        current.extend(filters.iter().cloned());
        recommend_groups(&stats, &current, params.groups_recommendation_strategy)
    };

    Ok(GroupedMetricsList {
        groups: grouped,
        group_recommendations,
    })
}

/// Whether `field_name` is present in at least one entry that also
/// defines the fields of the additional (non-`not_in`) filters. Used to
/// decide which predefined headline metrics the data can support;
/// `not_in` filters only narrow, so they are ignored for presence.
pub fn check_field_presence(
    entries: &[MetricsEntry],
    field_name: &str,
    additional_filters: &[String],
) -> Result<bool> {
    let parsed = parse_condition_list(additional_filters)?;
    let relevant: Vec<&Condition> = parsed
        .iter()
        .filter(|c| c.operator != ConditionOperator::NotIn)
        .collect();
    let base_field = extract_base_field_name(field_name);

    for entry in entries {
        if entry.fetch_value(base_field).is_none() {
            continue;
        }
        if relevant
            .iter()
            .all(|c| entry.fetch_value(&c.field_name).is_some())
        {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(name: &str, agent: &str, runner: &str, time: &str, lat: Option<f64>) -> MetricsEntry {
        let mut metrics = json!({});
        if let Some(lat) = lat {
            metrics = json!({"performance/latency/env_run_s_all": {"value": lat, "description": "run latency"}});
        }
        serde_json::from_value(json!({
            "name": name,
            "metadata": {"agent_name": agent, "runner": runner, "time_end_utc": time},
            "metrics": metrics,
        }))
        .unwrap()
    }

    fn sample_entries() -> Vec<MetricsEntry> {
        vec![
            run("r1", "alpha", "local", "2025-05-23T10:00:00", Some(10.0)),
            run("r2", "alpha", "hub", "2025-05-23T11:00:00", Some(20.0)),
            run("r3", "beta", "hub", "2025-05-23T12:00:00", Some(60.0)),
            run("r4", "beta", "local", "2025-05-23T13:00:00", None),
        ]
    }

    #[test]
    fn table_slices_by_agent() {
        let params = TableParams {
            slices: vec!["agent_name".to_string()],
            column_selections: vec!["/metrics/".to_string()],
            absent_metrics_strategy: AbsentMetricsStrategy::AcceptSubset,
            slices_recommendation_strategy: GroupsRecommendationStrategy::None,
            ..TableParams::default()
        };
        let table = create_table(sample_entries(), &params, &[], &[]).unwrap();

        // Header + one row per agent, in slice-key order.
        assert_eq!(table.rows.len(), 3);
        assert_eq!(
            table.rows[1][0].values.get("agent_name"),
            Some(&json!("alpha"))
        );
        assert_eq!(
            table.rows[2][0].values.get("agent_name"),
            Some(&json!("beta"))
        );
        assert_eq!(table.columns.len(), 1);
        assert_eq!(table.columns[0].name, "performance/latency/env_run_s_all");
        assert_eq!(table.columns[0].unit, Some(TableColumnUnit::Numerical));

        let alpha_cell = &table.rows[1][1];
        assert_eq!(alpha_cell.values.get("value"), Some(&json!(15.0)));
        assert_eq!(alpha_cell.values.get("min_value"), Some(&json!(10.0)));
        assert_eq!(alpha_cell.values.get("max_value"), Some(&json!(20.0)));
        // Tooltip details carry the static description.
        assert_eq!(
            alpha_cell.details.get("description"),
            Some(&json!("run latency"))
        );
        assert!(alpha_cell.details.get(N_GENUINE_KEY).is_none());
    }

    #[test]
    fn degenerate_table_has_single_aggregated_row() {
        let params = TableParams {
            column_selections: vec!["/metrics/".to_string()],
            absent_metrics_strategy: AbsentMetricsStrategy::AcceptSubset,
            ..TableParams::default()
        };
        let table = create_table(sample_entries(), &params, &[], &[]).unwrap();
        assert_eq!(table.rows.len(), 2);
        // No grouping dimension: the row-name cell has no values.
        assert!(table.rows[1][0].values.is_empty());
    }

    #[test]
    fn filters_reject_bad_syntax() {
        let params = TableParams {
            filters: vec!["runner:badop:x".to_string()],
            ..TableParams::default()
        };
        assert!(create_table(sample_entries(), &params, &[], &[]).is_err());
    }

    #[test]
    fn sort_on_unselected_column_errors() {
        let params = TableParams {
            column_selections: vec!["/metrics/".to_string()],
            sort_by: Some(("/metadata/agent_name".to_string(), SortOrder::Desc)),
            ..TableParams::default()
        };
        assert!(create_table(sample_entries(), &params, &[], &[]).is_err());
    }

    #[test]
    fn add_then_remove_selection() {
        // Slicing by both fields keeps them constant within each bucket, so
        // they surface in the aggregated column tree.
        let params = TableParams {
            slices: vec!["agent_name".to_string(), "runner".to_string()],
            column_selections: vec!["/metadata/".to_string()],
            slices_recommendation_strategy: GroupsRecommendationStrategy::None,
            ..TableParams::default()
        };
        let table = create_table(
            sample_entries(),
            &params,
            &[],
            &["/metadata/runner".to_string()],
        )
        .unwrap();
        let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"agent_name"));
        assert!(!names.contains(&"runner"));
    }

    #[test]
    fn timestamp_column_unit() {
        let params = TableParams {
            slices: vec!["agent_name".to_string()],
            column_selections: vec![
                "/metadata/time_end_utc/max_value".to_string(),
                "/metadata/time_end_utc/n_samples".to_string(),
            ],
            ..TableParams::default()
        };
        let table = create_table(sample_entries(), &params, &[], &[]).unwrap();
        let by_name: std::collections::BTreeMap<&str, Option<TableColumnUnit>> = table
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.unit))
            .collect();
        assert_eq!(
            by_name["time_end_utc/max_value"],
            Some(TableColumnUnit::Timestamp)
        );
        assert_eq!(
            by_name["time_end_utc/n_samples"],
            Some(TableColumnUnit::Numerical)
        );
    }

    #[test]
    fn recommends_unused_grouping_fields() {
        let params = TableParams {
            slices: vec!["agent_name".to_string()],
            column_selections: vec!["/metrics/".to_string()],
            slices_recommendation_strategy: GroupsRecommendationStrategy::Concise,
            ..TableParams::default()
        };
        let table = create_table(sample_entries(), &params, &[], &[]).unwrap();
        assert_eq!(table.slice_recommendations, vec!["runner".to_string()]);
    }

    #[test]
    fn logs_groups_newest_first() {
        let params = LogsParams {
            groups: vec!["agent_name".to_string()],
            groups_recommendation_strategy: GroupsRecommendationStrategy::None,
            ..LogsParams::default()
        };
        let list = create_logs_list(sample_entries(), &params).unwrap();
        assert_eq!(list.groups.len(), 2);
        // beta's newest run (13:00) beats alpha's (11:00).
        assert_eq!(
            list.groups[0].aggr_entry.fetch_value("agent_name"),
            Some(&json!("beta"))
        );
        assert_eq!(list.groups[0].entries.len(), 2);
        // Entries inside a group stay newest first.
        assert_eq!(list.groups[0].entries[0].name, "r4");
    }

    #[test]
    fn logs_group_recommendations() {
        let params = LogsParams {
            groups: vec!["agent_name".to_string()],
            groups_recommendation_strategy: GroupsRecommendationStrategy::Concise,
            ..LogsParams::default()
        };
        let list = create_logs_list(sample_entries(), &params).unwrap();
        assert_eq!(list.group_recommendations, vec!["runner".to_string()]);
    }

    #[test]
    fn field_presence_for_headline_metrics() {
        let entries = sample_entries();
        assert!(check_field_presence(&entries, "time_end_utc/n_samples", &[]).unwrap());
        assert!(!check_field_presence(&entries, "nonexistent/field", &[]).unwrap());
        // Additional not_in filters are ignored for the presence check.
        assert!(check_field_presence(
            &entries,
            "performance/latency/env_run_s_all",
            &[String::from("runner:not_in:local")]
        )
        .unwrap());
        // Other filters require their field to exist somewhere.
        assert!(!check_field_presence(
            &entries,
            "performance/latency/env_run_s_all",
            &[String::from("errors/summary/error_count_all:range:1:")]
        )
        .unwrap());
    }
}
