//! Health and metrics routes

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use road_detect::DetectorRole;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Detector name per category
    pub detectors: BTreeMap<&'static str, String>,
}

/// Health check handler
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let detectors = DetectorRole::ALL
        .iter()
        .map(|role| (role.as_str(), state.engine.detectors().get(*role).name().to_string()))
        .collect();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        detectors,
    })
}

/// Prometheus exposition of the engine metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}
