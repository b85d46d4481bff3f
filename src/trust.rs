// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Trust address allow-list for outbound transfer destinations.
//!
//! With the allow-list disabled every destination passes. Once enabled, a
//! destination passes only if a persisted entry matches both address and
//! currency symbol. A storage failure while checking counts as a deny.
//!
//! Operators maintain the list through a JSON file applied at boot
//! (`TRUST_ADDRESS_FILE`):
//!
//! ```json
//! {
//!   "enableTrustAddress": true,
//!   "trustAddressList": [
//!     { "address": "0xabc", "symbol": "ETH", "memo": "treasury" }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::models::TrustAddress;
use crate::storage::{NodeDatabase, StoreError, StoreResult};

#[derive(Debug, thiserror::Error)]
pub enum TrustListError {
    #[error("failed to read trust address file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse trust address file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("trust address entry {0} needs both address and symbol")]
    InvalidEntry(usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustList {
    #[serde(default)]
    pub enable_trust_address: bool,
    #[serde(default)]
    pub trust_address_list: Vec<TrustListEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrustListEntry {
    pub address: String,
    pub symbol: String,
    #[serde(default)]
    pub memo: String,
}

impl TrustList {
    pub fn from_file(path: &Path) -> Result<Self, TrustListError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// What a [`TrustGuard::sync`] changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrustSync {
    pub added: usize,
    pub removed: usize,
    pub kept: usize,
}

#[derive(Clone)]
pub struct TrustGuard {
    db: Arc<NodeDatabase>,
}

impl TrustGuard {
    pub fn new(db: Arc<NodeDatabase>) -> Self {
        Self { db }
    }

    pub fn is_enabled(&self) -> StoreResult<bool> {
        self.db.trust_address_enabled()
    }

    pub fn set_enabled(&self, enabled: bool) -> StoreResult<()> {
        self.db.set_trust_address_enabled(enabled)?;
        info!(enabled, "Trust address allow-list toggled");
        Ok(())
    }

    pub fn is_allowed(&self, address: &str, symbol: &str) -> bool {
        let enabled = match self.db.trust_address_enabled() {
            Ok(enabled) => enabled,
            Err(e) => {
                error!(error = %e, "Failed to read trust allow-list flag");
                return false;
            }
        };
        if !enabled {
            return true;
        }

        match self.db.has_trust_address(address, symbol) {
            Ok(found) => found,
            Err(e) => {
                error!(address = %address, symbol = %symbol, error = %e, "Trust address lookup failed");
                false
            }
        }
    }

    pub fn add(&self, address: &str, symbol: &str, memo: &str) -> StoreResult<TrustAddress> {
        let trust = TrustAddress::new(address, symbol, memo);
        self.db.add_trust_address(&trust)?;
        Ok(trust)
    }

    pub fn remove(&self, address: &str, symbol: &str) -> StoreResult<bool> {
        self.db.remove_trust_address(address, symbol)
    }

    pub fn list(&self, symbol: Option<&str>) -> StoreResult<Vec<TrustAddress>> {
        self.db.list_trust_addresses(symbol)
    }

    /// Make the stored allow-list equal `list`: entries it lacks are removed,
    /// new ones are added and the enable flag follows it. Nothing is written
    /// when an entry is malformed.
    pub fn sync(&self, list: &TrustList) -> Result<TrustSync, TrustListError> {
        if let Some(index) = list
            .trust_address_list
            .iter()
            .position(|e| e.address.trim().is_empty() || e.symbol.trim().is_empty())
        {
            return Err(TrustListError::InvalidEntry(index));
        }

        let wanted: HashSet<(&str, &str)> = list
            .trust_address_list
            .iter()
            .map(|e| (e.address.as_str(), e.symbol.as_str()))
            .collect();

        let mut report = TrustSync::default();
        for stored in self.list(None)? {
            if !wanted.contains(&(stored.address.as_str(), stored.symbol.as_str())) {
                self.remove(&stored.address, &stored.symbol)?;
                report.removed += 1;
            }
        }

        for entry in &list.trust_address_list {
            if self.db.has_trust_address(&entry.address, &entry.symbol)? {
                report.kept += 1;
            } else {
                self.add(&entry.address, &entry.symbol, &entry.memo)?;
                report.added += 1;
            }
        }

        self.set_enabled(list.enable_trust_address)?;
        if list.enable_trust_address && list.trust_address_list.is_empty() {
            warn!("Trust address allow-list enabled with no entries; all destinations are denied");
        }
        info!(
            added = report.added,
            removed = report.removed,
            kept = report.kept,
            enabled = list.enable_trust_address,
            "Trust address list applied"
        );
        Ok(report)
    }
}
