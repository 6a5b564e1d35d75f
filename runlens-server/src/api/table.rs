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

//! Aggregation table endpoints.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use runlens_core::{
    create_table, AbsentMetricsStrategy, GroupsRecommendationStrategy, PruneMode, SortOrder,
    Table, TableParams,
};

use super::{load_entries, ApiError, AppState};

/// Request model for table creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableCreationRequest {
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub slices: Vec<String>,
    #[serde(default)]
    pub column_selections: Vec<String>,
    #[serde(default)]
    pub column_selections_to_add: Vec<String>,
    #[serde(default)]
    pub column_selections_to_remove: Vec<String>,
    #[serde(default)]
    pub sort_by_column: Option<String>,
    #[serde(default = "default_sort_order")]
    pub sort_order: SortOrder,
    #[serde(default)]
    pub prune_mode: PruneMode,
    #[serde(default)]
    pub absent_metrics_strategy: AbsentMetricsStrategy,
    #[serde(default)]
    pub slices_recommendation_strategy: GroupsRecommendationStrategy,
}

fn default_sort_order() -> SortOrder {
    SortOrder::Desc
}

impl TableCreationRequest {
    fn params(&self) -> TableParams {
        TableParams {
            filters: self.filters.clone(),
            slices: self.slices.clone(),
            column_selections: self.column_selections.clone(),
            sort_by: self
                .sort_by_column
                .clone()
                .map(|column| (column, self.sort_order)),
            prune_mode: self.prune_mode,
            absent_metrics_strategy: self.absent_metrics_strategy,
            slices_recommendation_strategy: self.slices_recommendation_strategy,
        }
    }
}

fn build_table(state: &AppState, request: &TableCreationRequest) -> Result<Table, ApiError> {
    let entries = load_entries(state, false)?;
    tracing::info!(
        filters = request.filters.len(),
        slices = request.slices.len(),
        "building aggregation table"
    );
    create_table(
        entries,
        &request.params(),
        &request.column_selections_to_add,
        &request.column_selections_to_remove,
    )
    .map_err(ApiError::from)
}

/// POST /table/aggregation
pub async fn create_aggregation(
    State(state): State<AppState>,
    Json(request): Json<TableCreationRequest>,
) -> Result<Json<Table>, ApiError> {
    build_table(&state, &request).map(Json)
}

/// POST /table/aggregation_csv — the same table, rendered as CSV.
pub async fn create_aggregation_csv(
    State(state): State<AppState>,
    Json(request): Json<TableCreationRequest>,
) -> Result<Response, ApiError> {
    let table = build_table(&state, &request)?;
    Ok((
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        table.to_csv(),
    )
        .into_response())
}

/// GET /table/schema — accepted enum values for client discovery.
pub async fn schema() -> Json<serde_json::Value> {
    Json(json!({
        "prune_modes": ["none", "all", "column"],
        "absent_metrics_strategies": ["nullify", "accept_subset", "all_or_nothing"],
        "slices_recommendation_strategies": ["none", "first_alphabetical", "concise"],
        "sort_orders": ["asc", "desc"],
        "filter_operators": ["in", "not_in", "range"],
        "example_filters": [
            "agent_name:in:agent1,agent2,agent3",
            "runner:not_in:local",
            "debug_mode:in:true",
            "value:range:10:100",
            "value:range:10:",
            "value:range::100",
            "performance/latency/total_ms:range:1000:",
            "time_end_utc:range:(2025-05-23T04:00:00):",
        ],
        "example_column_selections": [
            "/metadata/",
            "/metrics/",
            "/metadata/agent_name",
            "/metadata/time_end_utc/max_value",
            "/metrics/performance/",
            "/metrics/performance/latency/total_ms",
        ],
        "example_slices": [
            "agent_name",
            "debug_mode",
            "runner:in:local",
            "performance/latency/total_ms:range:1000:",
        ],
        "column_selection_tips": [
            "Use paths ending with / to select all children (e.g., /metrics/performance/)",
            "Use exact paths for individual columns (e.g., /metrics/performance/latency/total_ms)",
            "Aggregated fields expose subfields (e.g., /metadata/time_end_utc/max_value)",
        ],
        "filter_tips": [
            "Filters are applied before aggregation",
            "Use comma-separated values for in/not_in operators",
            "Range operator supports open-ended ranges with : separator",
            "Parenthesize range bounds containing colons, e.g. (2025-05-23T04:00:00)",
        ],
        "slice_tips": [
            "Simple slices use just the field name (e.g., 'agent_name')",
            "Conditional slices use the same format as filters",
            "Slices determine how records are grouped for aggregation",
        ],
    }))
}
