//! The interceptor chain.
//!
//! A [`Pipeline`] is an ordered list of [`Interceptor`]s in front of an
//! [`Endpoint`]. Each stage gets the request and a [`Next`] handle; calling
//! [`Next::run`] hands the request to the rest of the chain. A stage may also
//! answer on its own (preflight, rate limit) without calling `next`.
//! Whatever error comes out of the chain is turned into a response by the
//! [`ErrorNormalizer`].

pub(crate) mod body;
mod cookies;
mod cors;
mod rate_limit;
mod request_log;
mod security_headers;

pub use body::{BodyParser, JsonBody};
pub use cookies::CookieParser;
pub use cors::{CorsPolicy, Origins};
pub use rate_limit::{
    spawn_sweeper, FixedWindowLimiter, RateLimitDecision, RateLimitStage, RateLimiter,
};
pub use request_log::{RequestLogger, ACCESS_TARGET};
pub use security_headers::SecurityHeaders;

use crate::api::error::{ApiError, ErrorNormalizer, RequestContext};
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    response::Response,
    Router,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tower::ServiceExt;

#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response, ApiError>;
}

/// The innermost handler the chain delivers requests to.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, request: Request) -> Result<Response, ApiError>;
}

/// The remainder of the chain after the current stage.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Interceptor>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    #[must_use]
    pub const fn new(stages: &'a [Arc<dyn Interceptor>], endpoint: &'a dyn Endpoint) -> Self {
        Self { stages, endpoint }
    }

    /// Pass the request to the next stage, or to the endpoint once the list is
    /// exhausted.
    ///
    /// # Errors
    /// Returns whatever error a later stage or the endpoint raised.
    pub async fn run(self, request: Request) -> Result<Response, ApiError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                stage
                    .handle(request, Next::new(rest, self.endpoint))
                    .await
            }
            None => self.endpoint.call(request).await,
        }
    }
}

/// Peer address of the request, resolved once before the chain runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub IpAddr);

pub struct Pipeline {
    stages: Vec<Arc<dyn Interceptor>>,
    endpoint: Arc<dyn Endpoint>,
    normalizer: ErrorNormalizer,
    trust_proxy: bool,
}

impl Pipeline {
    #[must_use]
    pub fn new(endpoint: Arc<dyn Endpoint>, normalizer: ErrorNormalizer) -> Self {
        Self {
            stages: Vec::new(),
            endpoint,
            normalizer,
            trust_proxy: false,
        }
    }

    /// Append a stage; stages run in the order they were added.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Interceptor>) -> Self {
        self.stages.push(stage);
        self
    }

    #[must_use]
    pub const fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run one request through every stage and the endpoint; never fails.
    pub async fn handle(&self, mut request: Request) -> Response {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |info| info.0.ip());
        let address = client_address(request.headers(), peer, self.trust_proxy);
        request.extensions_mut().insert(ClientAddr(address));

        let context = RequestContext {
            method: request.method().clone(),
            url: request.uri().to_string(),
            address,
            request_id: request_id(request.headers()),
        };

        match Next::new(&self.stages, self.endpoint.as_ref()).run(request).await {
            Ok(response) => response,
            Err(err) => self.normalizer.normalize(err, &context),
        }
    }
}

/// Routes requests through an axum [`Router`].
///
/// Handler errors come back as responses carrying the [`ApiError`] in their
/// extensions; those are turned back into `Err`.
#[derive(Clone)]
pub struct RouterEndpoint {
    router: Router,
}

impl RouterEndpoint {
    #[must_use]
    pub const fn new(router: Router) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Endpoint for RouterEndpoint {
    async fn call(&self, request: Request) -> Result<Response, ApiError> {
        let mut response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(ApiError::unexpected)?;

        match response.extensions_mut().remove::<ApiError>() {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }
}

/// Resolve the client address. Forwarding headers are honored only when the
/// service sits behind a trusted proxy.
#[must_use]
pub fn client_address(headers: &HeaderMap, peer: IpAddr, trust_proxy: bool) -> IpAddr {
    if !trust_proxy {
        return peer;
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| value.trim().parse::<IpAddr>().ok());
    if let Some(address) = forwarded {
        return address;
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok())
        .unwrap_or(peer)
}

pub(crate) fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("none")
        .to_string()
}

/// Copy `headers` onto the outcome of the rest of the chain, whichever way it
/// went.
pub(crate) fn decorate(
    result: Result<Response, ApiError>,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    match result {
        Ok(mut response) => {
            for (name, value) in headers {
                response.headers_mut().append(name, value.clone());
            }
            Ok(response)
        }
        Err(mut err) => {
            for (name, value) in headers {
                err.append_header(name.clone(), value.clone());
            }
            Err(err)
        }
    }
}
