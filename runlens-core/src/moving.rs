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

//! Time-bucketed moving aggregation for graphs.
//!
//! Records are bucketed into half-open windows `(begin, begin + g]` of
//! `time_granulation` milliseconds, anchored so the newest record falls in
//! the last window. Each window is reduced with the nullify strategy (an
//! empty window plots as 0), optionally one series per slice-field value.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::{aggregate_entries, AbsentMetricsStrategy};
use crate::categorize::{analyze_metadata, MetadataStats};
use crate::condition::{check_filters_against_entry, parse_filter_list, Condition};
use crate::entry::{extract_base_field_name, MetricsEntry};
use crate::error::{Error, Result};
use crate::value::{as_number, parse_timestamp_ms, value_to_string};

/// Ceiling on chart series; more lines than this is unreadable and the
/// caller should ask the analyst to narrow scope instead.
pub const MAX_GRAPH_LINES: usize = 20;

/// Default record field carrying the per-run timestamp.
pub const DEFAULT_TIME_FIELD: &str = "time_end_utc";

/// Parameters for a time-series request.
#[derive(Debug, Clone)]
pub struct MovingAggregationParams {
    /// Window width in milliseconds.
    pub time_granulation: i64,
    /// Field (possibly a sub-selector) reduced per window.
    pub field_name: String,
    /// Filters selecting the candidate record set.
    pub global_filters: Vec<String>,
    /// Filters applied per window, e.g. "only failed runs".
    pub moving_filters: Vec<String>,
    /// Optional field producing one series per distinct value.
    pub slice_field: String,
    /// Timestamp field used for bucketing.
    pub time_field: String,
}

impl MovingAggregationParams {
    pub fn new(time_granulation: i64, field_name: impl Into<String>) -> Self {
        Self {
            time_granulation,
            field_name: field_name.into(),
            global_filters: Vec::new(),
            moving_filters: Vec::new(),
            slice_field: String::new(),
            time_field: DEFAULT_TIME_FIELD.to_string(),
        }
    }
}

/// A computed time series.
#[derive(Debug, Clone, Serialize)]
pub struct MovingAggregation {
    pub time_begin: i64,
    pub time_end: i64,
    pub time_granulation: i64,
    /// The per-window filters that shaped the values.
    pub filters: Vec<Condition>,
    pub field_name: String,
    pub slice_field: String,
    pub slice_values: Vec<String>,
    /// One inner vector per series; all have one value per window.
    pub values: Vec<Vec<f64>>,
    pub min_value: f64,
    pub max_value: f64,
}

/// Outcome of a time-series computation. Exceeding the line ceiling is a
/// distinguished result, not an error: the caller renders guidance rather
/// than a truncated chart.
#[derive(Debug, Clone)]
pub enum TimeSeriesOutcome {
    Series(MovingAggregation),
    TooManyLines { line_count: usize, limit: usize },
}

/// Build the moving aggregation for `entries`.
pub fn create_moving_aggregation(
    entries: Vec<MetricsEntry>,
    params: &MovingAggregationParams,
) -> Result<TimeSeriesOutcome> {
    if params.time_granulation <= 0 {
        return Err(Error::InvalidTimeGranulation(params.time_granulation));
    }
    let global_filters = parse_filter_list(&params.global_filters)?;
    let moving_filters = parse_filter_list(&params.moving_filters)?;

    // Candidate set: globally filtered, with a parseable time field,
    // newest first.
    let filtered: Vec<MetricsEntry> = entries
        .into_iter()
        .filter(|e| check_filters_against_entry(e, &global_filters))
        .collect();
    let stats: MetadataStats = analyze_metadata(&filtered);

    let mut timed: Vec<(i64, MetricsEntry)> = filtered
        .into_iter()
        .filter_map(|e| {
            let t = e
                .fetch_value(&params.time_field)
                .and_then(|v| v.as_str().and_then(parse_timestamp_ms));
            t.map(|t| (t, e))
        })
        .collect();
    timed.sort_by(|a, b| b.0.cmp(&a.0));

    if timed.is_empty() {
        return Ok(TimeSeriesOutcome::Series(empty_result(
            params,
            moving_filters,
        )));
    }

    // Series per slice value, registered newest-first so the freshest
    // slice values lead the legend.
    let mut slice_index: BTreeMap<String, usize> = BTreeMap::new();
    let mut slice_values: Vec<String> = Vec::new();
    if !params.slice_field.is_empty() {
        for (_, entry) in &timed {
            if !check_filters_against_entry(entry, &moving_filters) {
                continue;
            }
            let key = slice_value_of(entry, &params.slice_field);
            if !slice_index.contains_key(&key) {
                slice_index.insert(key.clone(), slice_values.len());
                slice_values.push(key);
            }
        }
    }

    let line_count = slice_values.len().max(1);
    if line_count > MAX_GRAPH_LINES {
        return Ok(TimeSeriesOutcome::TooManyLines {
            line_count,
            limit: MAX_GRAPH_LINES,
        });
    }

    let time_end = timed.first().map(|(t, _)| *t).unwrap_or_default();
    let oldest = timed.last().map(|(t, _)| *t).unwrap_or_default();
    // Windows are (begin, begin + g]; anchor so the oldest entry falls
    // inside the first window.
    let n_windows = (time_end - oldest) / params.time_granulation + 1;
    let time_begin = time_end - n_windows * params.time_granulation;

    let base_field = extract_base_field_name(&params.field_name).to_string();
    let window_slices: Vec<Condition> = if params.slice_field.is_empty() {
        Vec::new()
    } else {
        vec![Condition::slice(&params.slice_field)]
    };

    let mut values: Vec<Vec<f64>> = vec![Vec::new(); line_count];
    let mut min_value: Option<f64> = None;
    let mut max_value: Option<f64> = None;
    let track = |v: f64, min_value: &mut Option<f64>, max_value: &mut Option<f64>| {
        *min_value = Some(min_value.map_or(v, |m| m.min(v)));
        *max_value = Some(max_value.map_or(v, |m| m.max(v)));
    };

    // Oldest entries pop first.
    let mut stack = timed;
    let mut window_begin = time_begin;
    while window_begin < time_end {
        let populated = values[0].len();

        let mut window_entries: Vec<MetricsEntry> = Vec::new();
        while let Some((t, _)) = stack.last() {
            if *t > window_begin + params.time_granulation {
                break;
            }
            let (_, entry) = stack.pop().unwrap();
            if !check_filters_against_entry(&entry, &moving_filters) {
                continue;
            }
            window_entries.push(thin_entry(&entry, &params.slice_field, &base_field));
        }

        let aggregated = aggregate_entries(
            &window_entries,
            &window_slices,
            &stats,
            AbsentMetricsStrategy::Nullify,
        );
        for aggr in aggregated {
            let index = if params.slice_field.is_empty() {
                0
            } else {
                let key = slice_value_of(&aggr, &params.slice_field);
                match slice_index.get(&key) {
                    Some(i) => *i,
                    // Unreachable in practice: every windowed entry passed
                    // the same filters used for registration.
                    None => continue,
                }
            };
            let v = aggr
                .fetch_value(&params.field_name)
                .and_then(as_number)
                .unwrap_or(0.0);
            track(v, &mut min_value, &mut max_value);
            values[index].push(v);
        }

        // Series that got no value this window plot as zero.
        for series in &mut values {
            if series.len() == populated {
                series.push(0.0);
                track(0.0, &mut min_value, &mut max_value);
            }
        }
        window_begin += params.time_granulation;
    }

    Ok(TimeSeriesOutcome::Series(MovingAggregation {
        time_begin,
        time_end,
        time_granulation: params.time_granulation,
        filters: moving_filters,
        field_name: params.field_name.clone(),
        slice_field: params.slice_field.clone(),
        slice_values,
        values,
        min_value: min_value.unwrap_or(0.0),
        max_value: max_value.unwrap_or(0.0),
    }))
}

fn empty_result(
    params: &MovingAggregationParams,
    moving_filters: Vec<Condition>,
) -> MovingAggregation {
    MovingAggregation {
        time_begin: 0,
        time_end: 0,
        time_granulation: params.time_granulation,
        filters: moving_filters,
        field_name: params.field_name.clone(),
        slice_field: params.slice_field.clone(),
        slice_values: Vec::new(),
        values: Vec::new(),
        min_value: 0.0,
        max_value: 0.0,
    }
}

fn slice_value_of(entry: &MetricsEntry, slice_field: &str) -> String {
    match entry.fetch_value(slice_field) {
        Some(v) if !v.is_null() => value_to_string(v),
        _ => "none".to_string(),
    }
}

/// Project an entry down to the fields the window reduction needs: the
/// slice value and the base field, wherever it lives.
fn thin_entry(entry: &MetricsEntry, slice_field: &str, base_field: &str) -> MetricsEntry {
    let mut thin = MetricsEntry::default();
    if !slice_field.is_empty() {
        if let Some(v) = entry.metadata.get(slice_field) {
            thin.metadata.insert(slice_field.to_string(), v.clone());
        }
    }
    if let Some(v) = entry.metadata.get(base_field) {
        thin.metadata.insert(base_field.to_string(), v.clone());
    }
    if let Some(v) = entry.metrics.get(base_field) {
        thin.metrics.insert(base_field.to_string(), v.clone());
    }
    thin
}
