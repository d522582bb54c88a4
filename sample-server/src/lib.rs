//! DevOps sample server - HTTP API for the CI/CD demo
//!
//! This crate provides the web backend:
//! - Service info, health, readiness and system info endpoints
//! - Static file serving from a configured directory
//! - A typed fault boundary that turns handler failures into JSON
//! - An explicit server lifecycle with graceful drain on shutdown

mod error;
mod lifecycle;
mod memory;
mod routes;
mod state;

use axum::{handler::HandlerWithoutStateExt, routing::get, Router};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir, trace::TraceLayer};

pub use error::{ApiError, ServerError};
pub use lifecycle::{shutdown_signal, Lifecycle, Server, ShutdownHandle};
pub use memory::{MemoryProbe, MemoryUsage, ProcessMemoryProbe};
pub use routes::health::{HealthResponse, ReadyResponse};
pub use routes::info::{InfoResponse, MemoryInfo};
pub use routes::root::{Endpoints, RootResponse};
pub use state::AppState;

/// Default listening port when `PORT` is not set
pub const DEFAULT_PORT: u16 = 3000;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    /// Upper bound on the drain phase. `None` waits for every connection.
    pub shutdown_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            static_dir: PathBuf::from("public"),
            shutdown_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Socket address string the listener binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Create the router with all routes
pub fn create_router(config: &ServerConfig, state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new(&config.static_dir)
        .call_fallback_on_method_not_allowed(true)
        .not_found_service(routes::not_found.into_service());

    let router = Router::new()
        .route("/", get(routes::root::root_handler))
        .route("/health", get(routes::health::health_handler))
        .route("/ready", get(routes::health::ready_handler))
        .route("/api/info", get(routes::info::info_handler))
        // Shared state
        .with_state(state)
        // Static file serving (must be last)
        .fallback_service(static_service);

    with_fault_boundary(router)
}

/// Catch handler panics as 500s and trace every request
fn with_fault_boundary(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(error::handle_panic))
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server and block until it has drained
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let server = Server::new(config);
    server.start().await?;
    Ok(())
}
