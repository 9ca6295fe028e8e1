//! Failure taxonomy and the error normalizer.
//!
//! Every stage and handler returns [`ApiError`]; nothing is turned into a
//! response until [`ErrorNormalizer::normalize`] sees it at the end of the
//! pipeline.

use crate::{account::StoreError, credentials::TokenError};
use axum::{
    http::{header::HeaderName, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::{fmt, net::IpAddr};
use tracing::{error, warn};
use utoipa::ToSchema;

const GENERIC_MESSAGE: &str = "Something went wrong";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ClientInput,
    AccountNotFound,
    InvalidCredential,
    RateLimitExceeded,
    StoreUnavailable,
    SigningUnavailable,
    UnexpectedFault,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientInput => "client_input",
            Self::AccountNotFound => "account_not_found",
            Self::InvalidCredential => "invalid_credential",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::StoreUnavailable => "store_unavailable",
            Self::SigningUnavailable => "signing_unavailable",
            Self::UnexpectedFault => "unexpected_fault",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure raised anywhere in the pipeline.
///
/// `headers` collects response headers added by decorating stages (CORS,
/// security headers, rate-limit counters) so the normalized response keeps
/// them.
#[derive(Debug, Clone)]
pub struct ApiError {
    kind: ErrorKind,
    status: Option<StatusCode>,
    message: String,
    detail: Option<String>,
    headers: HeaderMap,
}

impl ApiError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            detail: None,
            headers: HeaderMap::new(),
        }
    }

    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn client_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ClientInput, message).with_status(StatusCode::BAD_REQUEST)
    }

    #[must_use]
    pub fn payload_too_large() -> Self {
        Self::new(ErrorKind::ClientInput, "request entity too large")
            .with_status(StatusCode::PAYLOAD_TOO_LARGE)
    }

    #[must_use]
    pub fn route_not_found(method: &Method, path: &str) -> Self {
        Self::new(ErrorKind::ClientInput, format!("Cannot {method} {path}"))
            .with_status(StatusCode::NOT_FOUND)
    }

    #[must_use]
    pub fn account_not_found() -> Self {
        Self::new(ErrorKind::AccountNotFound, "User not found").with_status(StatusCode::NOT_FOUND)
    }

    #[must_use]
    pub fn invalid_credential() -> Self {
        Self::new(ErrorKind::InvalidCredential, "password incorrect")
            .with_status(StatusCode::BAD_REQUEST)
    }

    #[must_use]
    pub fn rate_limited() -> Self {
        Self::new(
            ErrorKind::RateLimitExceeded,
            "Too many requests, please try again later.",
        )
        .with_status(StatusCode::TOO_MANY_REQUESTS)
    }

    #[must_use]
    pub fn store_unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreUnavailable, "Service unavailable")
            .with_status(StatusCode::SERVICE_UNAVAILABLE)
            .with_detail(detail)
    }

    #[must_use]
    pub fn signing_unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::SigningUnavailable, GENERIC_MESSAGE)
            .with_status(StatusCode::INTERNAL_SERVER_ERROR)
            .with_detail(detail)
    }

    /// A fault nobody classified. Carries no status, so it normalizes to 500.
    #[must_use]
    pub fn unexpected(detail: impl fmt::Display) -> Self {
        Self::new(ErrorKind::UnexpectedFault, GENERIC_MESSAGE).with_detail(detail.to_string())
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Add a header to the eventual error response, replacing any previous value.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Append a header, keeping earlier values (used for `Vary`).
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.status(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => Self::store_unavailable(err.to_string()),
            StoreError::Corrupt(_) | StoreError::Rejected(_) => Self::unexpected(err),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        Self::signing_unavailable(err.to_string())
    }
}

/// Handlers run inside an axum router; the error rides out of it in the
/// response extensions and is lifted back into `Err` by the router endpoint.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = self.status().into_response();
        response.extensions_mut().insert(self);
        response
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Request facts captured before the chain runs, for error logging.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub url: String,
    pub address: IpAddr,
    pub request_id: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ErrorNormalizer {
    expose_detail: bool,
}

impl ErrorNormalizer {
    #[must_use]
    pub const fn new(expose_detail: bool) -> Self {
        Self { expose_detail }
    }

    #[must_use]
    pub fn envelope(&self, err: &ApiError) -> ErrorEnvelope {
        ErrorEnvelope {
            success: false,
            status: err.status().as_u16(),
            message: err.message.clone(),
            detail: if self.expose_detail {
                err.detail.clone()
            } else {
                None
            },
        }
    }

    /// Log `err` with its request context and turn it into the JSON envelope.
    #[must_use]
    pub fn normalize(&self, err: ApiError, context: &RequestContext) -> Response {
        let status = err.status();
        let detail = err.detail().unwrap_or_default();

        if status.is_server_error() {
            error!(
                kind = %err.kind,
                status = status.as_u16(),
                message = %err.message,
                detail,
                method = %context.method,
                url = %context.url,
                address = %context.address,
                request_id = %context.request_id,
                "request failed"
            );
        } else {
            warn!(
                kind = %err.kind,
                status = status.as_u16(),
                message = %err.message,
                detail,
                method = %context.method,
                url = %context.url,
                address = %context.address,
                request_id = %context.request_id,
                "request rejected"
            );
        }

        let mut response = (status, Json(self.envelope(&err))).into_response();
        for (name, value) in &err.headers {
            response.headers_mut().append(name, value.clone());
        }
        response
    }
}
