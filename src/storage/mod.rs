// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Node Storage
//!
//! Persistent state lives under `DATA_DIR`:
//!
//! ```text
//! {DATA_DIR}/
//!   keys/{wallet_id}/   # Key store (see `crate::keystore`)
//!   db/node.redb        # Settings, consolidation log, trust list, identity
//! ```
//!
//! The redb database is the only store with secondary indexes; the key store
//! is plain files written atomically.

pub mod node_db;
pub mod paths;

pub use node_db::{NodeDatabase, StoreError, StoreResult};
pub use paths::{is_valid_wallet_id, NodePaths};
