// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Trust-Node Relay
//!
//! Lets a remote control plane drive this node over an outbound WebSocket.
//!
//! - [`dispatcher`]: method table, appID and capability gates
//! - [`handlers`]: one handler per relay method
//! - [`link`]: the WebSocket connection and join handshake
//! - [`supervisor`]: keeps the link up with a fixed backoff

pub mod dispatcher;
pub mod handlers;
pub mod link;
pub mod supervisor;

pub use dispatcher::{Dispatcher, RelayMethod, RelayRequest, RelayResponse};
pub use link::WsConnector;
pub use supervisor::{CloseNotifier, LinkConnector, LinkError, LinkState, Supervisor};
