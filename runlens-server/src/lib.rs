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

//! Runlens HTTP service: thin axum glue around the query engine.

pub mod api;
pub mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use config::ServerConfig;
use runlens_storage::MetricsStore;

pub fn build_router(state: AppState, enable_cors: bool) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/table/aggregation", post(api::table::create_aggregation))
        .route(
            "/table/aggregation_csv",
            post(api::table::create_aggregation_csv),
        )
        .route("/table/schema", get(api::table::schema))
        .route("/logs/list", post(api::logs::list_logs))
        .route("/logs/schema", get(api::logs::schema))
        .route("/metrics/important", post(api::metrics::important_metrics))
        .route("/metrics/schema", get(api::metrics::schema))
        .route("/graphs/time-series", post(api::graphs::time_series))
        .route("/graphs/schema", get(api::graphs::schema))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }
    app
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "runlens_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Runlens Server");
    config.validate()?;

    let store = MetricsStore::new(
        config.storage.metrics_dir.clone(),
        Duration::from_secs(config.storage.cache_ttl_secs),
    );
    tracing::info!(
        metrics_dir = %config.storage.metrics_dir.display(),
        "serving metrics directory"
    );

    let state = AppState {
        store: Arc::new(store),
    };
    let app = build_router(state, config.server.enable_cors);

    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr).await?;
    tracing::info!("Listening on {}", config.server.listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
