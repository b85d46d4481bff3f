// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Node identity used to authenticate the relay link.
//!
//! The identity is a secp256k1 key pair generated on first boot and kept in
//! the node database as the "current" identity. The control plane registers
//! a node by its id, so replacing the key invalidates that registration and
//! requires `force`.

use chrono::{DateTime, Utc};
use k256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey};
use k256::elliptic_curve::rand_core::OsRng;
use k256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::storage::{NodeDatabase, StoreError};

const CURRENT_IDENTITY_KEY: &str = "current_identity";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("node identity already exists; regenerate with force to replace it")]
    AlreadyExists,

    #[error("identity key error: {0}")]
    Key(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    node_id: String,
    public_key: String,
    private_key_pem: String,
    created_at: DateTime<Utc>,
}

pub struct NodeIdentity {
    node_id: String,
    public_key: String,
    signing_key: SigningKey,
    created_at: DateTime<Utc>,
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("node_id", &self.node_id)
            .field("public_key", &self.public_key)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl NodeIdentity {
    /// Load the current identity, or generate and persist one on first boot.
    pub fn load_or_generate(db: &NodeDatabase) -> Result<Self, IdentityError> {
        match Self::load(db)? {
            Some(identity) => Ok(identity),
            None => Self::generate(db, false),
        }
    }

    /// Boot-time identity. `confirm_regenerate` replaces the current identity
    /// only when it names that identity's node id; any other value is ignored
    /// with a warning, so a stale confirmation never rotates the key twice.
    pub fn load_or_regenerate(
        db: &NodeDatabase,
        confirm_regenerate: Option<&str>,
    ) -> Result<Self, IdentityError> {
        let current = Self::load_or_generate(db)?;
        let Some(confirm) = confirm_regenerate else {
            return Ok(current);
        };

        if confirm != current.node_id {
            tracing::warn!(
                node_id = %current.node_id,
                confirm = %confirm,
                "Identity regeneration not confirmed for this node id, keeping current identity"
            );
            return Ok(current);
        }

        tracing::warn!(node_id = %current.node_id, "Regenerating node identity on operator request");
        Self::generate(db, true)
    }

    pub fn load(db: &NodeDatabase) -> Result<Option<Self>, IdentityError> {
        let Some(stored) = db.load_state::<StoredIdentity>(CURRENT_IDENTITY_KEY)? else {
            return Ok(None);
        };
        let signing_key = SigningKey::from_pkcs8_pem(&stored.private_key_pem)
            .map_err(|e| IdentityError::Key(e.to_string()))?;

        Ok(Some(Self {
            node_id: stored.node_id,
            public_key: stored.public_key,
            signing_key,
            created_at: stored.created_at,
        }))
    }

    /// Generate a new identity. Fails if one exists unless `force` is set.
    pub fn generate(db: &NodeDatabase, force: bool) -> Result<Self, IdentityError> {
        if !force && db.load_state::<StoredIdentity>(CURRENT_IDENTITY_KEY)?.is_some() {
            return Err(IdentityError::AlreadyExists);
        }

        let signing_key = SigningKey::random(&mut OsRng);
        let public_key_bytes = signing_key.verifying_key().to_encoded_point(true);
        let public_key = hex::encode(public_key_bytes.as_bytes());
        let node_id = hex::encode(&Sha256::digest(public_key_bytes.as_bytes())[..20]);

        let private_key_pem = signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| IdentityError::Key(e.to_string()))?;

        let stored = StoredIdentity {
            node_id: node_id.clone(),
            public_key: public_key.clone(),
            private_key_pem: private_key_pem.to_string(),
            created_at: Utc::now(),
        };
        db.store_state(CURRENT_IDENTITY_KEY, &stored)?;

        tracing::info!(node_id = %node_id, force, "Generated node identity");

        Ok(Self {
            node_id,
            public_key,
            signing_key,
            created_at: stored.created_at,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Signature over `sha256(app_id|node_id|timestamp)`, hex `r || s`.
    pub fn sign_join(&self, app_id: &str, timestamp: i64) -> Result<String, IdentityError> {
        let digest = join_digest(app_id, &self.node_id, timestamp);
        let signature: Signature = self
            .signing_key
            .sign_prehash(&digest)
            .map_err(|e| IdentityError::Key(e.to_string()))?;
        Ok(hex::encode(signature.to_bytes()))
    }
}

pub(crate) fn join_digest(app_id: &str, node_id: &str, timestamp: i64) -> [u8; 32] {
    Sha256::digest(format!("{app_id}|{node_id}|{timestamp}").as_bytes()).into()
}
