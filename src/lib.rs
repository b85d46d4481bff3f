// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custody Node - Consolidation Engine & Trust-Node Relay
//!
//! Operator-side node for a custodial multi-currency wallet platform. Key
//! material stays on the node; balances and trades live in a remote ledger
//! service.
//!
//! ## Modules
//!
//! - `consolidation` - Periodic sweeps into collection addresses
//! - `relay` - Delegated wallet operations from the control plane
//! - `keystore` - Local wallet keys (PKCS#8 PEM) gated by an unlock-secret digest
//! - `ledger` - Remote ledger service client
//! - `storage` - Settings, logs and trust list (redb)

pub mod config;
pub mod consolidation;
pub mod error;
pub mod identity;
pub mod keystore;
pub mod ledger;
pub mod models;
pub mod relay;
pub mod state;
pub mod storage;
pub mod trust;

#[cfg(test)]
mod testing;
