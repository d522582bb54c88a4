//! System info endpoint

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct MemoryInfo {
    pub total: String,
    pub used: String,
}

/// `runtime` is this service's counterpart of the `nodejs` version field
/// reported by Node-based deployments of the same app.
#[derive(Serialize)]
pub struct InfoResponse {
    pub application: &'static str,
    pub version: &'static str,
    pub runtime: &'static str,
    pub platform: &'static str,
    pub arch: &'static str,
    pub memory: MemoryInfo,
}

/// Runtime identifier, built from the workspace's minimum Rust version
const RUNTIME: &str = concat!("rust ", env!("CARGO_PKG_RUST_VERSION"));

pub async fn info_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InfoResponse>, ApiError> {
    let usage = state.memory().sample()?;

    Ok(Json(InfoResponse {
        application: "DevOps Sample App",
        version: env!("CARGO_PKG_VERSION"),
        runtime: RUNTIME,
        platform: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        memory: MemoryInfo {
            total: format!("{} MB", usage.total_mb()),
            used: format!("{} MB", usage.used_mb()),
        },
    }))
}
