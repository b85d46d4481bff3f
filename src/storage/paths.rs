// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path layout of the node's data directory.
//!
//! ```text
//! {DATA_DIR}/
//!   keys/{wallet_id}/
//!     meta.json       # Wallet metadata and unlock digest
//!     key.pem         # Private key (NEVER sent over the relay)
//!   db/
//!     node.redb       # Settings, consolidation log, trust list, identity
//! ```

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct NodePaths {
    root: PathBuf,
}

impl NodePaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Key Store Paths ==========

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    pub fn wallet_dir(&self, wallet_id: &str) -> PathBuf {
        self.keys_dir().join(wallet_id)
    }

    pub fn wallet_meta(&self, wallet_id: &str) -> PathBuf {
        self.wallet_dir(wallet_id).join("meta.json")
    }

    pub fn wallet_key(&self, wallet_id: &str) -> PathBuf {
        self.wallet_dir(wallet_id).join("key.pem")
    }

    // ========== Database Paths ==========

    pub fn db_dir(&self) -> PathBuf {
        self.root.join("db")
    }

    pub fn node_db(&self) -> PathBuf {
        self.db_dir().join("node.redb")
    }
}

/// Wallet ids name a directory under `keys/`, so only plain id characters
/// are accepted.
pub fn is_valid_wallet_id(wallet_id: &str) -> bool {
    !wallet_id.is_empty()
        && wallet_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
