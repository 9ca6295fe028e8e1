//! Process lifecycle: serve until a shutdown signal, drain in-flight
//! requests within a grace period, stop background tasks and release the
//! datastore.

mod inflight;
mod monitor;
mod signals;

pub use inflight::{track_request, InFlight};
pub use monitor::{spawn_monitor, ConnectionState};
pub use signals::shutdown_signal;

use crate::{
    account::AccountStore,
    api::middleware::{spawn_sweeper, RateLimiter},
};
use anyhow::{anyhow, Result};
use axum::Router;
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::watch};
use tracing::{error, info, warn};

pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// How long aborted requests get to unwind once the grace period is over.
const ABORT_WAIT: Duration = Duration::from_secs(1);

pub struct Lifecycle {
    store: Arc<dyn AccountStore>,
    limiter: Option<Arc<dyn RateLimiter>>,
    sweep_every: Duration,
    grace: Duration,
    monitor_every: Duration,
}

impl Lifecycle {
    #[must_use]
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self {
            store,
            limiter: None,
            sweep_every: Duration::from_secs(60),
            grace: DEFAULT_GRACE,
            monitor_every: DEFAULT_MONITOR_INTERVAL,
        }
    }

    /// Sweep expired rate-limit windows every `every` while serving.
    #[must_use]
    pub fn with_limiter(mut self, limiter: Arc<dyn RateLimiter>, every: Duration) -> Self {
        self.limiter = Some(limiter);
        self.sweep_every = every;
        self
    }

    #[must_use]
    pub const fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    #[must_use]
    pub const fn with_monitor_interval(mut self, every: Duration) -> Self {
        self.monitor_every = every;
        self
    }

    /// Serve `app` on `listener` until `shutdown` resolves, then tear down.
    ///
    /// # Errors
    /// Returns an error if the server stops on its own before a shutdown
    /// signal arrives.
    pub async fn run<F>(self, listener: TcpListener, app: Router, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let monitor = spawn_monitor(self.store.clone(), self.monitor_every, stop_rx.clone());
        let sweeper = self
            .limiter
            .clone()
            .map(|limiter| spawn_sweeper(limiter, self.sweep_every, stop_rx.clone()));

        if let Ok(address) = listener.local_addr() {
            info!("Listening on {}", address);
        }

        let inflight = InFlight::new();
        let app = app.layer(axum::middleware::from_fn_with_state(
            inflight.clone(),
            track_request,
        ));

        let (drain_tx, mut drain_rx) = watch::channel(false);
        let serve = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = drain_rx.changed().await;
        });
        let mut server = tokio::spawn(async move { serve.await });

        let early_exit = tokio::select! {
            result = &mut server => Some(result),
            () = shutdown => None,
        };

        let outcome = if let Some(result) = early_exit {
            error!("Server stopped before shutdown was requested");
            match result {
                Ok(Ok(())) => Err(anyhow!("server stopped unexpectedly")),
                Ok(Err(err)) => Err(anyhow!("server failed: {err}")),
                Err(err) => Err(anyhow!("server task failed: {err}")),
            }
        } else {
            info!("Gracefully shutdown");
            let _ = drain_tx.send(true);

            match tokio::time::timeout(self.grace, &mut server).await {
                Ok(Ok(Ok(()))) => info!("In-flight requests drained"),
                Ok(Ok(Err(err))) => error!("Server error while draining: {err}"),
                Ok(Err(err)) => error!("Server task failed while draining: {err}"),
                Err(_) => {
                    warn!(
                        grace_seconds = self.grace.as_secs(),
                        active = inflight.active(),
                        "Grace period elapsed, aborting in-flight requests"
                    );
                    if inflight.abort_all(ABORT_WAIT).await {
                        info!("In-flight requests aborted");
                    }
                    server.abort();
                }
            }
            Ok(())
        };

        let _ = stop_tx.send(true);
        if let Err(err) = monitor.await {
            warn!("Datastore monitor ended abnormally: {err}");
        }
        if let Some(sweeper) = sweeper {
            if let Err(err) = sweeper.await {
                warn!("Rate limit sweeper ended abnormally: {err}");
            }
        }

        self.store.close().await;
        info!("datastore disconnected");

        outcome
    }
}
