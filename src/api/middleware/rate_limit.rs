//! Fixed-window rate limiting keyed by client address.

use super::{ClientAddr, Interceptor, Next};
use crate::api::error::ApiError;
use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header::RETRY_AFTER, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use dashmap::DashMap;
use std::{
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::debug;

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset: Duration,
    },
    Limited {
        limit: u32,
        reset: Duration,
    },
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, key: IpAddr) -> RateLimitDecision;

    /// Drop state that can no longer affect a decision; returns how many
    /// entries were removed.
    fn sweep(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Counts requests per address; the count resets when the window rolls over.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    windows: DashMap<IpAddr, Window>,
    max: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max,
            window,
        }
    }

    #[must_use]
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    fn check_at(&self, key: IpAddr, now: Instant) -> RateLimitDecision {
        let mut entry = self.windows.entry(key).or_insert(Window {
            started: now,
            count: 0,
        });
        let window = entry.value_mut();

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }

        let reset = self
            .window
            .saturating_sub(now.duration_since(window.started));
        if window.count >= self.max {
            return RateLimitDecision::Limited {
                limit: self.max,
                reset,
            };
        }

        window.count += 1;
        RateLimitDecision::Allowed {
            limit: self.max,
            remaining: self.max - window.count,
            reset,
        }
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.duration_since(window.started) < self.window);
        before.saturating_sub(self.windows.len())
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, key: IpAddr) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }
}

/// Purge expired windows every `every` until `stop` flips.
pub fn spawn_sweeper(
    limiter: Arc<dyn RateLimiter>,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.sweep();
                    if removed > 0 {
                        debug!(removed, "rate limit windows purged");
                    }
                }
                _ = stop.changed() => break,
            }
        }
        debug!("rate limit sweeper stopped");
    })
}

pub struct RateLimitStage {
    limiter: Arc<dyn RateLimiter>,
}

impl RateLimitStage {
    #[must_use]
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self { limiter }
    }
}

fn seconds(reset: Duration) -> HeaderValue {
    let secs = reset.as_secs() + u64::from(reset.subsec_nanos() > 0);
    HeaderValue::from(secs)
}

#[async_trait]
impl Interceptor for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn handle(&self, request: Request, next: Next<'_>) -> Result<Response, ApiError> {
        let address = request
            .extensions()
            .get::<ClientAddr>()
            .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |addr| addr.0);

        match self.limiter.check(address) {
            RateLimitDecision::Allowed {
                limit,
                remaining,
                reset,
            } => {
                let mut headers = HeaderMap::new();
                headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
                headers.insert(RATELIMIT_REMAINING, HeaderValue::from(remaining));
                headers.insert(RATELIMIT_RESET, seconds(reset));
                super::decorate(next.run(request).await, &headers)
            }
            RateLimitDecision::Limited { limit, reset } => {
                let mut err = ApiError::rate_limited();
                err.insert_header(RATELIMIT_LIMIT, HeaderValue::from(limit));
                err.insert_header(RATELIMIT_REMAINING, HeaderValue::from(0u32));
                err.insert_header(RATELIMIT_RESET, seconds(reset));
                err.insert_header(RETRY_AFTER, seconds(reset));
                Err(err)
            }
        }
    }
}
