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

//! HTTP API: request shapes, shared state, and error mapping.

pub mod graphs;
pub mod logs;
pub mod metrics;
pub mod table;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use runlens_core::{Error as EngineError, MetricsEntry};
use runlens_storage::{MetricsStore, StorageError};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MetricsStore>,
}

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        // Every engine error is the caller's request, not our state.
        ApiError::BadRequest(e.to_string())
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::DirNotFound(_) => ApiError::NotFound(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Load the record snapshot for a query, 404ing when the corpus is empty.
pub(crate) fn load_entries(
    state: &AppState,
    include_log_files: bool,
) -> Result<Vec<MetricsEntry>, ApiError> {
    let entries = state.store.load_entries(include_log_files)?;
    if entries.is_empty() {
        return Err(ApiError::NotFound("no metrics entries found".to_string()));
    }
    Ok(entries)
}
