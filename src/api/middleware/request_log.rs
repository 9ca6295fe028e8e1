//! Access log: one entry when a request arrives and one when it completes.
//!
//! Entries go to the `warden::access` target, which the file layer always
//! records regardless of console verbosity.

use super::{request_id, ClientAddr, Interceptor, Next};
use crate::api::error::ApiError;
use async_trait::async_trait;
use axum::{extract::Request, response::Response};
use chrono::Utc;
use std::time::Instant;
use tracing::info;

pub const ACCESS_TARGET: &str = "warden::access";

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger;

#[async_trait]
impl Interceptor for RequestLogger {
    fn name(&self) -> &'static str {
        "request_log"
    }

    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response, ApiError> {
        let started = Instant::now();
        let method = request.method().clone();
        let url = request.uri().to_string();
        let request_id = request_id(request.headers());
        let address = request
            .extensions()
            .get::<ClientAddr>()
            .map(|addr| addr.0.to_string())
            .unwrap_or_default();

        info!(
            target: "warden::access",
            method = %method,
            url = %url,
            timestamp = %Utc::now().to_rfc3339(),
            request_id = %request_id,
            address = %address,
            "request received"
        );

        let result = next.run(request).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(response) => info!(
                target: "warden::access",
                method = %method,
                url = %url,
                request_id = %request_id,
                address = %address,
                status = response.status().as_u16(),
                latency_ms,
                "request completed"
            ),
            Err(err) => info!(
                target: "warden::access",
                method = %method,
                url = %url,
                request_id = %request_id,
                address = %address,
                status = err.status().as_u16(),
                kind = %err.kind(),
                detail = err.detail().unwrap_or(err.message()),
                latency_ms,
                "request failed"
            ),
        }

        result
    }
}
