//! HTTP surface: the interceptor chain, its error normalizer and the routes
//! behind it.

pub mod error;
pub mod handlers;
pub mod middleware;
mod openapi;

pub use openapi::openapi;

use crate::account::AccountStore;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    response::Response,
    Extension, Router,
};
use error::ErrorNormalizer;
use handlers::auth::AuthState;
use middleware::{
    BodyParser, CookieParser, CorsPolicy, Origins, Pipeline, RateLimitStage, RateLimiter,
    RequestLogger, RouterEndpoint, SecurityHeaders,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info_span, Span};
use ulid::Ulid;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    origins: Origins,
    body_limit: usize,
    trust_proxy: bool,
    expose_error_detail: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            origins: Origins::Any,
            body_limit: middleware::body::DEFAULT_BODY_LIMIT,
            trust_proxy: false,
            expose_error_detail: true,
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_origins(mut self, origins: Origins) -> Self {
        self.origins = origins;
        self
    }

    #[must_use]
    pub const fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    #[must_use]
    pub const fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    #[must_use]
    pub const fn with_expose_error_detail(mut self, expose: bool) -> Self {
        self.expose_error_detail = expose;
        self
    }
}

/// Build the full chain in front of the routes.
#[must_use]
pub fn pipeline(
    config: &ApiConfig,
    auth: Arc<AuthState>,
    store: Arc<dyn AccountStore>,
    limiter: Arc<dyn RateLimiter>,
) -> Pipeline {
    let (router, _openapi) = openapi::api_router().split_for_parts();
    let routes = router
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::not_found)
        .layer(Extension(auth))
        .layer(Extension(store));

    Pipeline::new(
        Arc::new(RouterEndpoint::new(routes)),
        ErrorNormalizer::new(config.expose_error_detail),
    )
    .with_trust_proxy(config.trust_proxy)
    .with_stage(Arc::new(RequestLogger))
    .with_stage(Arc::new(CorsPolicy::new(config.origins.clone())))
    .with_stage(Arc::new(SecurityHeaders::new()))
    .with_stage(Arc::new(CookieParser))
    .with_stage(Arc::new(RateLimitStage::new(limiter)))
    .with_stage(Arc::new(BodyParser::new(config.body_limit)))
}

/// Wrap a pipeline in the request-id and tracing layers.
pub fn app(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(pipeline)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
}

async fn dispatch(State(pipeline): State<Arc<Pipeline>>, request: Request) -> Response {
    pipeline.handle(request).await
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = request.uri().path(),
        request_id
    )
}
