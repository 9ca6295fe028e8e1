//! Datastore connection monitor.

use crate::account::AccountStore;
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Next state after a ping, if it differs from `current`.
fn transition(current: ConnectionState, ping_ok: bool) -> Option<ConnectionState> {
    let next = if ping_ok {
        ConnectionState::Connected
    } else {
        ConnectionState::Disconnected
    };
    (next != current).then_some(next)
}

/// Ping the store every `every` and log `connected`/`disconnected` when the
/// state flips. Stops when `stop` changes.
pub fn spawn_monitor(
    store: Arc<dyn AccountStore>,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut state = ConnectionState::Connected;
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let ping = store.ping().await;
                    if let Some(next) = transition(state, ping.is_ok()) {
                        match ping {
                            Ok(()) => info!("datastore connected"),
                            Err(err) => warn!(error = %err, "datastore disconnected"),
                        }
                        state = next;
                    }
                }
                _ = stop.changed() => break,
            }
        }
        debug!("datastore monitor stopped");
    })
}
