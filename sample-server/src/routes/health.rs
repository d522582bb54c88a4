//! Liveness and readiness endpoints

use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime: f64,
    pub environment: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
}

/// Liveness check
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime: state.uptime_secs(),
        environment: state.environment(),
    })
}

/// Readiness check. The server takes traffic as soon as it is listening.
pub async fn ready_handler() -> Json<ReadyResponse> {
    Json(ReadyResponse { status: "ready" })
}
