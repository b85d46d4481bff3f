// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WebSocket link to the control plane.
//!
//! After connecting, the node sends a `newNodeJoin` frame signed by its
//! identity key. Every inbound text frame after that is a relay call; each
//! call is dispatched on its own task and answered on the same socket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::dispatcher::{Dispatcher, RelayRequest};
use super::handlers::CONNECT_TYPE;
use super::supervisor::{CloseNotifier, LinkConnector, LinkError};
use crate::state::NodeState;

pub const JOIN_METHOD: &str = "newNodeJoin";

/// Outbound frames waiting for the writer task.
const OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinParams {
    #[serde(rename = "appID")]
    app_id: String,
    #[serde(rename = "nodeID")]
    node_id: String,
    node_name: String,
    connect_type: &'static str,
    public_key: String,
    timestamp: i64,
    signature: String,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct JoinFrame {
    method: &'static str,
    params: JoinParams,
}

pub struct WsConnector {
    url: String,
    timeout: Duration,
    dispatcher: Dispatcher,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, timeout: Duration, state: Arc<NodeState>) -> Self {
        Self {
            url: url.into(),
            timeout,
            dispatcher: Dispatcher::new(state),
        }
    }

    fn join_frame(&self) -> Result<String, LinkError> {
        let state = self.dispatcher.state();
        let timestamp = Utc::now().timestamp();
        let signature = state
            .identity
            .sign_join(&state.config.app_id, timestamp)
            .map_err(|e| LinkError::Handshake(e.to_string()))?;

        let frame = JoinFrame {
            method: JOIN_METHOD,
            params: JoinParams {
                app_id: state.config.app_id.clone(),
                node_id: state.identity.node_id().to_string(),
                node_name: state.config.local_name.clone(),
                connect_type: CONNECT_TYPE,
                public_key: state.identity.public_key().to_string(),
                timestamp,
                signature,
                version: env!("CARGO_PKG_VERSION"),
            },
        };
        serde_json::to_string(&frame).map_err(|e| LinkError::Handshake(e.to_string()))
    }
}

#[async_trait]
impl LinkConnector for WsConnector {
    async fn connect(&self, on_close: CloseNotifier) -> Result<(), LinkError> {
        info!(url = %self.url, "Connecting to trusted server");

        let (stream, _) = tokio::time::timeout(self.timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| LinkError::Timeout)?
            .map_err(|e| LinkError::Connect(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let join = self.join_frame()?;
        tokio::time::timeout(self.timeout, sink.send(Message::Text(join)))
            .await
            .map_err(|_| LinkError::Timeout)?
            .map_err(|e| LinkError::Handshake(e.to_string()))?;
        info!(node_id = %self.dispatcher.state().identity.node_id(), "Join frame sent");

        let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    warn!(error = %e, "Failed to write to trusted server link");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        let dispatcher = dispatcher.clone();
                        let out_tx = out_tx.clone();
                        tokio::spawn(async move {
                            if let Some(reply) = serve_frame(&dispatcher, &text).await {
                                let _ = out_tx.send(Message::Text(reply)).await;
                            }
                        });
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Trusted server link read failed");
                        break;
                    }
                }
            }
            info!("Trusted server link closed");
            on_close.notify();
        });

        Ok(())
    }
}

/// Answer one inbound text frame. Frames that are not calls get no reply.
async fn serve_frame(dispatcher: &Dispatcher, text: &str) -> Option<String> {
    let request: RelayRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Ignoring non-call frame");
            return None;
        }
    };

    let response = dispatcher.handle(request).await;
    match serde_json::to_string(&response) {
        Ok(reply) => Some(reply),
        Err(e) => {
            warn!(error = %e, "Failed to encode relay reply");
            None
        }
    }
}
