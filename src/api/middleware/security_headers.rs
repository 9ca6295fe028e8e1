//! Hardening headers on every response.

use super::{Interceptor, Next};
use crate::api::error::ApiError;
use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue},
    response::Response,
};

const CONTENT_SECURITY_POLICY: &str = "default-src 'self';base-uri 'self';font-src 'self' https: data:;\
form-action 'self';frame-ancestors 'self';img-src 'self' data:;object-src 'none';script-src 'self';\
script-src-attr 'none';style-src 'self' https: 'unsafe-inline';upgrade-insecure-requests";

const HARDENING: &[(&str, &str)] = &[
    ("content-security-policy", CONTENT_SECURITY_POLICY),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: HeaderMap,
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in HARDENING {
            headers.insert(
                HeaderName::from_static(*name),
                HeaderValue::from_static(*value),
            );
        }
        Self { headers }
    }
}

impl SecurityHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Interceptor for SecurityHeaders {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response, ApiError> {
        match next.run(request).await {
            Ok(mut response) => {
                let headers = response.headers_mut();
                headers.remove("x-powered-by");
                for (name, value) in &self.headers {
                    headers.insert(name, value.clone());
                }
                Ok(response)
            }
            Err(mut err) => {
                for (name, value) in &self.headers {
                    err.insert_header(name.clone(), value.clone());
                }
                Err(err)
            }
        }
    }
}
