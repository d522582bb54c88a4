//! Error types
//!
//! `ApiError` is the boundary between handlers and the wire: expected
//! outcomes (not found) and faults (anything that should have worked but
//! didn't) both end up as JSON, with different status codes and log levels.

use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Label sent in the `error` field of every 500 response
pub const FAULT_LABEL: &str = "Something went wrong!";

/// Errors a handler can return
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Cannot {method} {path}")]
    NotFound { method: Method, path: String },

    #[error("process memory unavailable: {0}")]
    MemoryUnavailable(String),
}

/// Errors raised while binding, serving or draining
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("connections still open after drain timeout of {0:?}")]
    DrainTimedOut(Duration),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::MemoryUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let label = match &self {
            ApiError::NotFound { .. } => {
                tracing::debug!("{}", self);
                "Not Found"
            }
            _ => {
                tracing::error!("{}", self);
                FAULT_LABEL
            }
        };

        let body = ErrorBody {
            error: label,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Turn a handler panic into the same 500 payload as any other fault
pub(crate) fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };

    tracing::error!("handler panicked: {}", message);

    let body = ErrorBody {
        error: FAULT_LABEL,
        message,
    };

    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
