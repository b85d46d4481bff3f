// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Connection Supervisor
//!
//! Keeps the outbound link to the control plane up.
//!
//! Two single-slot channels drive the state machine: a reconnect signal makes
//! one connection attempt, a disconnect signal waits out the backoff and then
//! raises a reconnect signal. Both are handled by one loop, so at most one
//! attempt is ever in flight. A failed attempt and a link's close callback both
//! raise a disconnect signal.
//!
//! ```text
//! Disconnected --reconnect--> Connecting --ok--> Connected
//!      ^                          |                  |
//!      +--------- backoff <-------+--err    close ---+
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("connect timed out")]
    Timeout,

    #[error("join handshake failed: {0}")]
    Handshake(String),
}

/// Handed to each connection; fires when that link goes away.
#[derive(Debug, Clone)]
pub struct CloseNotifier {
    disconnect: mpsc::Sender<()>,
}

impl CloseNotifier {
    pub fn notify(&self) {
        // A pending signal already covers this close.
        let _ = self.disconnect.try_send(());
    }

    #[cfg(test)]
    pub(crate) fn for_tests(disconnect: mpsc::Sender<()>) -> Self {
        Self { disconnect }
    }
}

#[async_trait]
pub trait LinkConnector: Send + Sync + 'static {
    /// Establish the link and announce this node. Returns once the link is up;
    /// `on_close` must fire when it later drops.
    async fn connect(&self, on_close: CloseNotifier) -> Result<(), LinkError>;
}

pub struct Supervisor<C> {
    connector: Arc<C>,
    backoff: Duration,
    state: watch::Sender<LinkState>,
}

impl<C: LinkConnector> Supervisor<C> {
    pub fn new(connector: C, backoff: Duration) -> Self {
        let (state, _) = watch::channel(LinkState::Disconnected);
        Self {
            connector: Arc::new(connector),
            backoff,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Drive the reconnect loop until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        let (reconnect_tx, mut reconnect_rx) = mpsc::channel::<()>(1);
        let (disconnect_tx, mut disconnect_rx) = mpsc::channel::<()>(1);

        let _ = reconnect_tx.try_send(());
        info!(backoff_ms = self.backoff.as_millis() as u64, "Link supervisor starting");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                Some(()) = reconnect_rx.recv() => {
                    self.state.send_replace(LinkState::Connecting);
                    let notifier = CloseNotifier { disconnect: disconnect_tx.clone() };
                    match self.connector.connect(notifier).await {
                        Ok(()) => {
                            self.state.send_replace(LinkState::Connected);
                            info!("Link to trusted server established");
                        }
                        Err(e) => {
                            self.state.send_replace(LinkState::Disconnected);
                            warn!(error = %e, "Link to trusted server failed");
                            let _ = disconnect_tx.try_send(());
                        }
                    }
                }

                Some(()) = disconnect_rx.recv() => {
                    self.state.send_replace(LinkState::Disconnected);
                    info!(backoff_ms = self.backoff.as_millis() as u64, "Reconnecting after backoff");
                    tokio::select! {
                        _ = tokio::time::sleep(self.backoff) => {},
                        _ = shutdown.cancelled() => break,
                    }
                    let _ = reconnect_tx.try_send(());
                }
            }
        }

        self.state.send_replace(LinkState::Disconnected);
        info!("Link supervisor shutting down");
    }
}
