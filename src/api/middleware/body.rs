//! Bounded JSON body parsing.

use super::{Interceptor, Next};
use crate::api::error::ApiError;
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::header::{CONTENT_LENGTH, CONTENT_TYPE},
    response::Response,
};
use serde_json::Value;

pub const DEFAULT_BODY_LIMIT: usize = 100 * 1024;

/// Decoded JSON body, present in request extensions when the request carried
/// a non-empty JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonBody(pub Value);

#[derive(Debug, Clone, Copy)]
pub struct BodyParser {
    limit: usize,
}

impl Default for BodyParser {
    fn default() -> Self {
        Self::new(DEFAULT_BODY_LIMIT)
    }
}

impl BodyParser {
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self { limit }
    }
}

fn is_json(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| mime.trim().to_ascii_lowercase())
        .is_some_and(|mime| mime == "application/json" || mime.ends_with("+json"))
}

fn declared_length(request: &Request) -> Option<usize> {
    request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

#[async_trait]
impl Interceptor for BodyParser {
    fn name(&self) -> &'static str {
        "body"
    }

    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response, ApiError> {
        if !is_json(&request) {
            return next.run(request).await;
        }

        if declared_length(&request).is_some_and(|length| length > self.limit) {
            return Err(ApiError::payload_too_large());
        }

        let (mut parts, body) = request.into_parts();
        // Without a declared length the body can only fail to buffer by
        // running past the limit.
        let bytes = axum::body::to_bytes(body, self.limit)
            .await
            .map_err(|err| ApiError::payload_too_large().with_detail(err.to_string()))?;

        if !bytes.iter().all(u8::is_ascii_whitespace) {
            let value: Value = serde_json::from_slice(&bytes).map_err(|err| {
                ApiError::client_input("malformed JSON body").with_detail(err.to_string())
            })?;
            parts.extensions.insert(JsonBody(value));
        }

        next.run(Request::from_parts(parts, Body::from(bytes))).await
    }
}
