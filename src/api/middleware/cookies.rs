//! Parses the `Cookie` header into a [`CookieJar`] for later stages.

use super::{Interceptor, Next};
use crate::api::error::ApiError;
use async_trait::async_trait;
use axum::{extract::Request, response::Response};
use axum_extra::extract::cookie::CookieJar;

#[derive(Debug, Clone, Copy, Default)]
pub struct CookieParser;

#[async_trait]
impl Interceptor for CookieParser {
    fn name(&self) -> &'static str {
        "cookies"
    }

    async fn handle(&self, mut request: Request, next: Next<'_>) -> Result<Response, ApiError> {
        let jar = CookieJar::from_headers(request.headers());
        request.extensions_mut().insert(jar);
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        error::ErrorNormalizer,
        middleware::{tests::request, Endpoint, Pipeline},
    };
    use anyhow::Result;
    use axum::{
        http::{header::COOKIE, HeaderValue, StatusCode},
        response::IntoResponse,
    };
    use std::sync::Arc;

    struct EchoCookie;

    #[async_trait]
    impl Endpoint for EchoCookie {
        async fn call(&self, request: Request) -> Result<Response, ApiError> {
            let value = request
                .extensions()
                .get::<CookieJar>()
                .and_then(|jar| jar.get("theme").map(|cookie| cookie.value().to_string()))
                .unwrap_or_default();
            Ok((StatusCode::OK, value).into_response())
        }
    }

    #[tokio::test]
    async fn cookies_are_available_downstream() -> Result<()> {
        let pipeline = Pipeline::new(Arc::new(EchoCookie), ErrorNormalizer::new(true))
            .with_stage(Arc::new(CookieParser));

        let mut req = request("GET", "/")?;
        req.headers_mut()
            .insert(COOKIE, HeaderValue::from_static("theme=dark; access_token=abc"));

        let response = pipeline.handle(req).await;
        let body = axum::body::to_bytes(response.into_body(), 1024).await?;
        assert_eq!(&body[..], b"dark");
        Ok(())
    }
}
