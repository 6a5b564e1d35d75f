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

//! Grouped log listing endpoints.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use runlens_core::{
    create_logs_list, GroupedMetricsList, GroupsRecommendationStrategy, LogsParams, PruneMode,
};

use super::{load_entries, ApiError, AppState};

/// Request model for listing logs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListLogsRequest {
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default = "default_prune_mode")]
    pub prune_mode: PruneMode,
    #[serde(default)]
    pub groups_recommendation_strategy: GroupsRecommendationStrategy,
}

fn default_prune_mode() -> PruneMode {
    PruneMode::All
}

/// POST /logs/list — grouped runs, newest group first, with log files.
pub async fn list_logs(
    State(state): State<AppState>,
    Json(request): Json<ListLogsRequest>,
) -> Result<Json<GroupedMetricsList>, ApiError> {
    let entries = load_entries(&state, true)?;
    tracing::info!(
        filters = request.filters.len(),
        groups = request.groups.len(),
        "building logs list"
    );
    let params = LogsParams {
        filters: request.filters,
        groups: request.groups,
        prune_mode: request.prune_mode,
        groups_recommendation_strategy: request.groups_recommendation_strategy,
    };
    create_logs_list(entries, &params)
        .map(Json)
        .map_err(ApiError::from)
}

/// GET /logs/schema
pub async fn schema() -> Json<serde_json::Value> {
    Json(json!({
        "prune_modes": ["none", "all", "column"],
        "groups_recommendation_strategies": ["none", "first_alphabetical", "concise"],
        "filter_operators": ["in", "not_in", "range"],
        "example_filters": [
            "agent_name:in:agent1,agent2,agent3",
            "runner:not_in:local",
            "time_end_utc:range:(2025-05-23T04:00:00):",
        ],
        "example_groups": [
            "agent_name",
            "runner:in:local",
        ],
        "group_tips": [
            "Groups use the same grammar as slices",
            "Each group carries an aggregate summary entry plus its runs",
            "Groups are ordered by their most recent run, newest first",
        ],
    }))
}
