//! Cross-origin policy, backed by `tower_http::cors::CorsLayer`.

use super::{Interceptor, Next};
use crate::api::error::ApiError;
use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use tower::{service_fn, Layer, ServiceExt};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::warn;

const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::HEAD,
    Method::PUT,
    Method::PATCH,
    Method::POST,
    Method::DELETE,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origins {
    Any,
    List(Vec<String>),
}

impl Origins {
    /// No configured origins means any origin.
    #[must_use]
    pub fn from_list(origins: Vec<String>) -> Self {
        let origins: Vec<String> = origins
            .into_iter()
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
            Self::Any
        } else {
            Self::List(origins)
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    layer: CorsLayer,
}

impl CorsPolicy {
    /// Any origin gets `*`; a listed origin is echoed back with credentials
    /// allowed.
    #[must_use]
    pub fn new(origins: Origins) -> Self {
        let layer = CorsLayer::new()
            .allow_methods(ALLOWED_METHODS)
            .allow_headers(AllowHeaders::mirror_request());

        let layer = match origins {
            Origins::Any => layer.allow_origin(AllowOrigin::any()),
            Origins::List(allowed) => {
                let allowed: Vec<HeaderValue> = allowed
                    .iter()
                    .filter_map(|origin| match HeaderValue::from_str(origin) {
                        Ok(value) => Some(value),
                        Err(_) => {
                            warn!(origin = %origin, "ignoring invalid CORS origin");
                            None
                        }
                    })
                    .collect();
                layer
                    .allow_origin(AllowOrigin::list(allowed))
                    .allow_credentials(true)
            }
        };

        Self { layer }
    }
}

#[async_trait]
impl Interceptor for CorsPolicy {
    fn name(&self) -> &'static str {
        "cors"
    }

    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response, ApiError> {
        // The layer answers every OPTIONS request itself.
        let preflight = request.method() == Method::OPTIONS;

        // Errors ride through the layer as responses carrying the ApiError,
        // so they pick up the CORS headers too.
        let inner = service_fn(move |request: Request| async move {
            Ok::<_, Infallible>(match next.run(request).await {
                Ok(response) => response,
                Err(err) => err.into_response(),
            })
        });

        let mut response = self
            .layer
            .layer(inner)
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {});

        if preflight {
            *response.status_mut() = StatusCode::NO_CONTENT;
        }

        match response.extensions_mut().remove::<ApiError>() {
            Some(mut err) => {
                for (name, value) in response.headers() {
                    err.append_header(name.clone(), value.clone());
                }
                Err(err)
            }
            None => Ok(response),
        }
    }
}
