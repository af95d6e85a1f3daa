use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use platewatch_core::SanitizedConfig;

use crate::metrics;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
    pub active_jobs: i64,
    pub version: String,
}

/// Liveness probe. Reads the job store so database connectivity is part of
/// the signal.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    match state.jobs().active_count() {
        Ok(active_jobs) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                timestamp: Utc::now().to_rfc3339(),
                database: "connected".to_string(),
                active_jobs,
                version: VERSION.to_string(),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy".to_string(),
                timestamp: Utc::now().to_rfc3339(),
                database: e.to_string(),
                active_jobs: 0,
                version: VERSION.to_string(),
            }),
        ),
    }
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

/// Prometheus text exposition.
pub async fn get_metrics() -> impl IntoResponse {
    metrics::render()
}
