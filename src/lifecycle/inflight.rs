//! In-flight request tracking, so that requests still running when the
//! grace period ends can be cancelled before the datastore is released.

use crate::api::error::ErrorEnvelope;
use axum::{
    extract::{Request, State},
    http::{header::CONNECTION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::{future::Future, time::Duration};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::warn;

#[derive(Clone, Debug, Default)]
pub struct InFlight {
    tracker: TaskTracker,
    abort: CancellationToken,
}

impl InFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests currently being handled.
    #[must_use]
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Run `request` unless it is aborted first, in which case the caller
    /// gets a 503 and the request future is dropped.
    pub async fn track<F>(&self, request: F) -> Response
    where
        F: Future<Output = Response>,
    {
        let abort = self.abort.clone();
        self.tracker
            .track_future(async move {
                tokio::select! {
                    biased;
                    () = abort.cancelled() => aborted(),
                    response = request => response,
                }
            })
            .await
    }

    /// Cancel every tracked request and wait up to `limit` for them to stop.
    /// Returns `false` if some were still running when `limit` elapsed.
    pub async fn abort_all(&self, limit: Duration) -> bool {
        self.abort.cancel();
        self.tracker.close();
        if tokio::time::timeout(limit, self.tracker.wait()).await.is_ok() {
            true
        } else {
            warn!(active = self.active(), "in-flight requests did not stop");
            false
        }
    }
}

fn aborted() -> Response {
    let envelope = ErrorEnvelope {
        success: false,
        status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
        message: "Server shutting down".to_string(),
        detail: None,
    };
    let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(envelope)).into_response();
    response
        .headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

/// `axum::middleware::from_fn_with_state` adapter for [`InFlight::track`].
pub async fn track_request(
    State(inflight): State<InFlight>,
    request: Request,
    next: Next,
) -> Response {
    inflight.track(next.run(request)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    #[tokio::test]
    async fn finished_requests_pass_through() -> Result<()> {
        let inflight = InFlight::new();
        let response = inflight
            .track(async { StatusCode::CREATED.into_response() })
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(inflight.active(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn abort_cancels_running_requests() -> Result<()> {
        let inflight = InFlight::new();
        let finished = Arc::new(AtomicBool::new(false));

        let task = {
            let inflight = inflight.clone();
            let finished = finished.clone();
            tokio::spawn(async move {
                inflight
                    .track(async move {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        finished.store(true, Ordering::SeqCst);
                        StatusCode::CREATED.into_response()
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(inflight.active(), 1);

        assert!(inflight.abort_all(Duration::from_secs(1)).await);
        let response = task.await?;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(CONNECTION),
            Some(&HeaderValue::from_static("close"))
        );
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(inflight.active(), 0);
        Ok(())
    }
}
