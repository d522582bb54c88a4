//! Root endpoint

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct Endpoints {
    pub health: &'static str,
    pub ready: &'static str,
    pub api: &'static str,
}

#[derive(Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub endpoints: Endpoints,
}

pub async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "DevOps Multi-Cloud Sample Application",
        version: env!("CARGO_PKG_VERSION"),
        description: "A sample Rust application for CI/CD pipeline demonstration",
        endpoints: Endpoints {
            health: "/health",
            ready: "/ready",
            api: "/api/info",
        },
    })
}
