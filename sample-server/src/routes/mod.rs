//! HTTP route handlers

pub mod health;
pub mod info;
pub mod root;

use axum::http::{Method, Uri};

use crate::error::ApiError;

/// Fallback for paths that match neither a route nor a static file
pub async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::NotFound {
        method,
        path: uri.path().to_string(),
    }
}
