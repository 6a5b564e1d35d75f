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

//! Headline metrics: which of the predefined dashboard metrics the
//! current record set can actually support.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use runlens_core::{check_field_presence, filter_entries, parse_filter_list};

use super::{load_entries, ApiError, AppState};

/// Headline metrics: display name → (additional filters, field name).
/// Emitted to the caller only when the field has at least one
/// contributing record after filtering.
const IMPORTANT_METRICS: &[(&str, &[&str], &str)] = &[
    ("Agent Invocations", &[], "time_end_utc/n_samples"),
    ("Instances", &[], "instance_updated_at/n_samples"),
    (
        "Successful Invocations",
        &["errors/summary/error_count_all:range::0"],
        "time_end_utc/n_samples",
    ),
    (
        "Failed Invocations",
        &["errors/summary/error_count_all:range:1:"],
        "time_end_utc/n_samples",
    ),
    (
        "Avg Agent Latency",
        &[],
        "performance/latency/init_and_env_run_s_all",
    ),
    (
        "Max Agent Latency",
        &[],
        "performance/latency/init_and_env_run_s_all/max_value",
    ),
    (
        "Avg Runner Start Latency",
        &["runner:not_in:local"],
        "performance/latency/runner_latency_s",
    ),
    (
        "Max Runner Start Latency",
        &["runner:not_in:local"],
        "performance/latency/runner_latency_s/max_value",
    ),
    (
        "Avg Completion Latency",
        &[],
        "api_calls/inference_client_completions/latency_s_avg",
    ),
    (
        "Max Completion Latency",
        &[],
        "api_calls/inference_client_completions/latency_s_max/max_value",
    ),
];

/// Request model for important metrics.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportantMetricsRequest {
    #[serde(default)]
    pub filters: Vec<String>,
}

/// POST /metrics/important
pub async fn important_metrics(
    State(state): State<AppState>,
    Json(request): Json<ImportantMetricsRequest>,
) -> Result<Json<BTreeMap<String, (Vec<String>, String)>>, ApiError> {
    let entries = load_entries(&state, false)?;
    let conditions = parse_filter_list(&request.filters).map_err(ApiError::from)?;
    let entries = filter_entries(entries, &conditions);

    let mut result = BTreeMap::new();
    for (display_name, additional_filters, field_name) in IMPORTANT_METRICS {
        let additional: Vec<String> =
            additional_filters.iter().map(|s| s.to_string()).collect();
        if check_field_presence(&entries, field_name, &additional).map_err(ApiError::from)? {
            result.insert(display_name.to_string(), (additional, field_name.to_string()));
        }
    }
    Ok(Json(result))
}

/// GET /metrics/schema
pub async fn schema() -> Json<serde_json::Value> {
    let predefined: Vec<&str> = IMPORTANT_METRICS.iter().map(|(name, _, _)| *name).collect();
    Json(json!({
        "important_metrics": {
            "description": "Headline metrics present in the data after filtering",
            "filters": {
                "format": "field_name:operator:value",
                "operators": ["in", "not_in", "range"],
                "examples": [
                    "user:in:analyst.one",
                    "runner:not_in:local",
                    "time_end_utc:range:(2025-05-23T04:00:00):",
                ],
            },
            "predefined_metrics": predefined,
            "response_format": "display_name -> [additional_filters, field_name]",
        }
    }))
}
