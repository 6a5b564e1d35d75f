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

//! End-to-end scenarios across the whole engine: filter → slice →
//! aggregate → prune → table, logs grouping, and time series.

use serde_json::json;

use runlens_core::{
    create_logs_list, create_moving_aggregation, create_table, AbsentMetricsStrategy,
    GroupsRecommendationStrategy, LogsParams, MetricsEntry, MovingAggregationParams, PruneMode,
    SortOrder, TableParams, TimeSeriesOutcome,
};

const DAY_MS: i64 = 86_400_000;

fn run(
    name: &str,
    agent: &str,
    runner: &str,
    time: &str,
    latency: Option<f64>,
    errors: f64,
) -> MetricsEntry {
    let mut metrics = serde_json::Map::new();
    if let Some(latency) = latency {
        metrics.insert(
            "performance/latency/env_run_s_all".to_string(),
            json!({"value": latency, "description": "total env run time"}),
        );
    }
    metrics.insert(
        "errors/summary/error_count_all".to_string(),
        json!({"value": errors}),
    );
    serde_json::from_value(json!({
        "name": name,
        "metadata": {
            "agent_name": agent,
            "runner": runner,
            "time_end_utc": time,
            "user": "analyst.one",
        },
        "metrics": metrics,
    }))
    .unwrap()
}

fn corpus() -> Vec<MetricsEntry> {
    vec![
        run("r1", "alpha", "local", "2025-05-23T10:00:00", Some(12.0), 0.0),
        run("r2", "alpha", "hub", "2025-05-23T15:00:00", Some(18.0), 1.0),
        run("r3", "beta", "hub", "2025-05-24T09:00:00", Some(40.0), 0.0),
        run("r4", "beta", "hub", "2025-05-24T12:00:00", None, 2.0),
        run("r5", "alpha", "local", "2025-05-24T18:00:00", Some(6.0), 0.0),
    ]
}

#[test]
fn filtered_sliced_sorted_table() {
    let params = TableParams {
        filters: vec!["runner:in:hub".to_string()],
        slices: vec!["agent_name".to_string()],
        column_selections: vec!["/metrics/".to_string()],
        sort_by: Some((
            "/metrics/performance/latency/env_run_s_all".to_string(),
            SortOrder::Desc,
        )),
        prune_mode: PruneMode::None,
        absent_metrics_strategy: AbsentMetricsStrategy::AcceptSubset,
        slices_recommendation_strategy: GroupsRecommendationStrategy::None,
    };
    let table = create_table(corpus(), &params, &[], &[]).unwrap();

    // hub runs: r2 (alpha, 18), r3 (beta, 40), r4 (beta, absent).
    assert_eq!(table.rows.len(), 3);
    // Sorted descending by latency: beta (40) before alpha (18).
    assert_eq!(
        table.rows[1][0].details.get("agent_name"),
        Some(&json!("beta"))
    );
    let latency_index = table
        .columns
        .iter()
        .position(|c| c.name == "performance/latency/env_run_s_all")
        .unwrap()
        + 1;
    assert_eq!(
        table.rows[1][latency_index].values.get("value"),
        Some(&json!(40.0))
    );
    assert_eq!(
        table.rows[1][latency_index].values.get("n_samples"),
        None,
    );
    assert_eq!(table.filters.len(), 1);
    assert_eq!(table.filters[0].to_string(), "runner:in:hub");
    assert_eq!(table.sorted_by.as_ref().unwrap().sort_order, SortOrder::Desc);
}

#[test]
fn conditional_slice_builds_two_rows() {
    let params = TableParams {
        slices: vec!["runner:in:local".to_string()],
        column_selections: vec!["/metrics/errors/".to_string()],
        prune_mode: PruneMode::None,
        absent_metrics_strategy: AbsentMetricsStrategy::AcceptSubset,
        slices_recommendation_strategy: GroupsRecommendationStrategy::None,
        ..TableParams::default()
    };
    let table = create_table(corpus(), &params, &[], &[]).unwrap();
    // Matched and unmatched partitions, false sorting before true.
    assert_eq!(table.rows.len(), 3);
    let errors_index = 1;
    // Unmatched (hub) runs: errors 1, 0, 2 → mean 1.0.
    assert_eq!(
        table.rows[1][errors_index].values.get("value"),
        Some(&json!(1.0))
    );
    // Matched (local) runs: errors 0, 0 → mean 0.0.
    assert_eq!(
        table.rows[2][errors_index].values.get("value"),
        Some(&json!(0.0))
    );
}

#[test]
fn pruning_drops_constant_column_but_not_explicit_selection() {
    // errors is 0 in every sliced row; latency varies.
    let entries = vec![
        run("r1", "alpha", "local", "2025-05-23T10:00:00", Some(12.0), 0.0),
        run("r2", "beta", "local", "2025-05-23T11:00:00", Some(30.0), 0.0),
    ];
    let base = TableParams {
        slices: vec!["agent_name".to_string()],
        column_selections: vec!["/metrics/".to_string()],
        prune_mode: PruneMode::Column,
        absent_metrics_strategy: AbsentMetricsStrategy::AllOrNothing,
        slices_recommendation_strategy: GroupsRecommendationStrategy::None,
        ..TableParams::default()
    };
    let table = create_table(entries.clone(), &base, &[], &[]).unwrap();
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert!(names.contains(&"performance/latency/env_run_s_all"));
    assert!(!names.contains(&"errors/summary/error_count_all"));

    // The same column survives when selected by exact leaf path.
    let explicit = TableParams {
        column_selections: vec![
            "/metrics/".to_string(),
            "/metrics/errors/summary/error_count_all".to_string(),
        ],
        ..base
    };
    let table = create_table(entries, &explicit, &[], &[]).unwrap();
    let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
    assert!(names.contains(&"errors/summary/error_count_all"));
}

#[test]
fn csv_export_matches_visible_rows() {
    let params = TableParams {
        slices: vec!["agent_name".to_string()],
        column_selections: vec!["/metrics/performance/".to_string()],
        prune_mode: PruneMode::None,
        absent_metrics_strategy: AbsentMetricsStrategy::AcceptSubset,
        slices_recommendation_strategy: GroupsRecommendationStrategy::None,
        ..TableParams::default()
    };
    let table = create_table(corpus(), &params, &[], &[]).unwrap();
    let csv = table.to_csv();
    let lines: Vec<&str> = csv.trim_end().split("\r\n").collect();
    assert_eq!(lines.len(), table.rows.len());
    assert!(lines[0].contains("performance/latency/env_run_s_all"));
    assert!(lines[1].starts_with("agent_name: alpha"));
}

#[test]
fn logs_list_groups_and_recommends() {
    let params = LogsParams {
        filters: vec!["user:in:analyst.one".to_string()],
        groups: vec!["agent_name".to_string()],
        prune_mode: PruneMode::None,
        groups_recommendation_strategy: GroupsRecommendationStrategy::Concise,
    };
    let list = create_logs_list(corpus(), &params).unwrap();
    assert_eq!(list.groups.len(), 2);
    // alpha's newest run (T18:00) beats beta's (T12:00).
    assert_eq!(
        list.groups[0].aggr_entry.fetch_value("agent_name"),
        Some(&json!("alpha"))
    );
    let total: usize = list.groups.iter().map(|g| g.entries.len()).sum();
    assert_eq!(total, 5);
    // runner groups the records; user is constant and time/name unique.
    assert_eq!(list.group_recommendations, vec!["runner".to_string()]);
}

#[test]
fn time_series_daily_buckets_per_agent() {
    let mut params =
        MovingAggregationParams::new(DAY_MS, "performance/latency/env_run_s_all");
    params.slice_field = "agent_name".to_string();
    match create_moving_aggregation(corpus(), &params).unwrap() {
        TimeSeriesOutcome::Series(ma) => {
            assert_eq!(ma.slice_values.len(), 2);
            assert_eq!(ma.values.len(), 2);
            let buckets = ((ma.time_end - ma.time_begin) / DAY_MS) as usize;
            for series in &ma.values {
                assert_eq!(series.len(), buckets);
            }
        }
        TimeSeriesOutcome::TooManyLines { .. } => panic!("two agents cannot exceed the ceiling"),
    }
}
