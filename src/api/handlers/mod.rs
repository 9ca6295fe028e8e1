//! Route handlers behind the interceptor chain.

pub mod auth;
pub mod health;

use crate::api::error::ApiError;
use axum::http::{Method, Uri};

/// Fallback for unknown routes and unsupported methods.
pub async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::route_not_found(&method, uri.path())
}
