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

//! Time-series graph endpoints.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use runlens_core::{
    create_moving_aggregation, MovingAggregationParams, TimeSeriesOutcome, DEFAULT_TIME_FIELD,
};

use super::{load_entries, ApiError, AppState};

/// Request model for time series graph creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovingAggregationRequest {
    /// Time granulation in ms
    pub time_granulation: i64,
    /// A field name (can be a sub-selector) reduced per window
    pub moving_aggregation_field_name: String,
    /// Global filters to apply first
    #[serde(default)]
    pub global_filters: Vec<String>,
    /// Filter conditions applied per window
    #[serde(default)]
    pub moving_aggregation_filters: Vec<String>,
    /// Optional slice field: one series per distinct value
    #[serde(default)]
    pub slice_field: String,
    /// Timestamp field used for bucketing
    #[serde(default = "default_time_field")]
    pub time_field: String,
}

fn default_time_field() -> String {
    DEFAULT_TIME_FIELD.to_string()
}

/// POST /graphs/time-series
///
/// Responds with the series, or with a `too_many_lines` payload when the
/// slice would draw an unreadable chart — the caller should ask the
/// analyst to narrow scope.
pub async fn time_series(
    State(state): State<AppState>,
    Json(request): Json<MovingAggregationRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let entries = load_entries(&state, false)?;
    let params = MovingAggregationParams {
        time_granulation: request.time_granulation,
        field_name: request.moving_aggregation_field_name,
        global_filters: request.global_filters,
        moving_filters: request.moving_aggregation_filters,
        slice_field: request.slice_field,
        time_field: request.time_field,
    };
    match create_moving_aggregation(entries, &params).map_err(ApiError::from)? {
        TimeSeriesOutcome::Series(series) => Ok(Json(
            serde_json::to_value(series)
                .map_err(|e| ApiError::Internal(e.to_string()))?,
        )),
        TimeSeriesOutcome::TooManyLines { line_count, limit } => Ok(Json(json!({
            "too_many_lines": true,
            "line_count": line_count,
            "max_lines": limit,
            "detail": format!(
                "slicing by `{}` would draw {line_count} lines (limit {limit}); narrow the filters or drop the slice",
                params.slice_field
            ),
        }))),
    }
}

/// GET /graphs/schema
pub async fn schema() -> Json<serde_json::Value> {
    Json(json!({
        "time_series": {
            "description": "Time-bucketed moving aggregation for charting",
            "parameters": {
                "time_granulation": {
                    "description": "Window width in milliseconds",
                    "type": "integer",
                    "example": 86_400_000,
                },
                "moving_aggregation_field_name": {
                    "description": "Field (or sub-selector) reduced per window",
                    "type": "string",
                    "example": "performance/latency/env_run_s_all",
                },
                "global_filters": {
                    "description": "Filters selecting the candidate record set",
                    "type": "array",
                    "example": ["runner:not_in:local"],
                },
                "moving_aggregation_filters": {
                    "description": "Filters applied per window",
                    "type": "array",
                    "example": ["errors/summary/error_count_all:range::0"],
                },
                "slice_field": {
                    "description": "Optional field producing one series per value",
                    "type": "string",
                    "example": "agent_name",
                },
                "time_field": {
                    "description": "Timestamp field used for bucketing",
                    "type": "string",
                    "example": "time_end_utc",
                },
            },
            "response_format": {
                "time_begin": "window origin, epoch milliseconds",
                "time_end": "newest record time, epoch milliseconds",
                "time_granulation": "window width in milliseconds",
                "field_name": "aggregated field name",
                "slice_field": "slice field name (empty when unsliced)",
                "slice_values": "one entry per series",
                "values": "one array of per-window values per series",
                "min_value": "minimum plotted value",
                "max_value": "maximum plotted value",
                "filters": "per-window filters applied",
            },
            "line_limit": runlens_core::MAX_GRAPH_LINES,
        }
    }))
}
