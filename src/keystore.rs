// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local key store.
//!
//! One secp256k1 key per wallet, stored as PKCS#8 PEM next to a metadata file
//! holding an HMAC-SHA256 digest of the wallet's unlock secret. Private key
//! bytes never leave this module; callers only ever get an [`UnlockedKey`]
//! that can sign 32-byte digests.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use k256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey};
use k256::elliptic_curve::rand_core::OsRng;
use k256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::models::{LocalWallet, RawTransaction};
use crate::storage::{is_valid_wallet_id, NodePaths};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("invalid wallet id: {0:?}")]
    InvalidWalletId(String),

    #[error("wallet secret is incorrect")]
    WrongSecret,

    #[error("wallet secret is empty")]
    EmptySecret,

    #[error("key encoding error: {0}")]
    KeyEncoding(String),

    #[error("invalid message to sign: {0}")]
    InvalidMessage(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

/// On-disk wallet metadata (`meta.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WalletMeta {
    wallet_id: String,
    alias: String,
    public_key: String,
    secret_digest: String,
    created_at: DateTime<Utc>,
}

impl From<WalletMeta> for LocalWallet {
    fn from(meta: WalletMeta) -> Self {
        LocalWallet {
            wallet_id: meta.wallet_id,
            alias: meta.alias,
            public_key: meta.public_key,
            created_at: meta.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyStore {
    paths: NodePaths,
}

impl KeyStore {
    pub fn new(paths: NodePaths) -> Self {
        Self { paths }
    }

    /// Generate a new wallet key protected by `secret`.
    pub fn create_wallet(&self, alias: &str, secret: &str) -> KeyStoreResult<LocalWallet> {
        if secret.is_empty() {
            return Err(KeyStoreError::EmptySecret);
        }

        let wallet_id = Uuid::new_v4().simple().to_string();
        let signing_key = SigningKey::random(&mut OsRng);
        let key_pem = signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyStoreError::KeyEncoding(e.to_string()))?;

        let meta = WalletMeta {
            wallet_id: wallet_id.clone(),
            alias: alias.to_string(),
            public_key: public_key_hex(&signing_key),
            secret_digest: hex::encode(secret_digest(&wallet_id, secret)?),
            created_at: Utc::now(),
        };

        let key_path = self.paths.wallet_key(&wallet_id);
        if let Some(parent) = key_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&key_path, key_pem.as_bytes())?;
        write_json(&self.paths.wallet_meta(&wallet_id), &meta)?;

        tracing::info!(wallet_id = %wallet_id, alias = %alias, "Created local wallet key");
        Ok(meta.into())
    }

    pub fn wallet(&self, wallet_id: &str) -> KeyStoreResult<LocalWallet> {
        self.load_meta(wallet_id).map(Into::into)
    }

    /// Every wallet with a key in this store, oldest first.
    pub fn list_wallets(&self) -> KeyStoreResult<Vec<LocalWallet>> {
        let keys_dir = self.paths.keys_dir();
        if !keys_dir.exists() {
            return Ok(Vec::new());
        }

        let mut wallets = Vec::new();
        for entry in fs::read_dir(&keys_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(wallet_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match self.load_meta(&wallet_id) {
                Ok(meta) => wallets.push(LocalWallet::from(meta)),
                Err(e) => {
                    tracing::warn!(wallet_id = %wallet_id, error = %e, "Skipping unreadable wallet");
                }
            }
        }
        wallets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(wallets)
    }

    /// Check `secret` without loading the private key.
    pub fn verify_secret(&self, wallet_id: &str, secret: &str) -> KeyStoreResult<()> {
        let meta = self.load_meta(wallet_id)?;
        let expected =
            hex::decode(&meta.secret_digest).map_err(|e| KeyStoreError::KeyEncoding(e.to_string()))?;

        let mut mac = HmacSha256::new_from_slice(wallet_id.as_bytes())
            .map_err(|e| KeyStoreError::KeyEncoding(e.to_string()))?;
        mac.update(secret.as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| KeyStoreError::WrongSecret)
    }

    /// Verify `secret` and load the wallet's signing key.
    pub fn unlock(&self, wallet_id: &str, secret: &str) -> KeyStoreResult<UnlockedKey> {
        self.verify_secret(wallet_id, secret)?;

        let pem = fs::read_to_string(self.paths.wallet_key(wallet_id))?;
        let signing_key = SigningKey::from_pkcs8_pem(&pem)
            .map_err(|e| KeyStoreError::KeyEncoding(e.to_string()))?;

        Ok(UnlockedKey {
            wallet_id: wallet_id.to_string(),
            signing_key,
        })
    }

    fn load_meta(&self, wallet_id: &str) -> KeyStoreResult<WalletMeta> {
        if !is_valid_wallet_id(wallet_id) {
            return Err(KeyStoreError::InvalidWalletId(wallet_id.to_string()));
        }
        let path = self.paths.wallet_meta(wallet_id);
        if !path.exists() {
            return Err(KeyStoreError::WalletNotFound(wallet_id.to_string()));
        }
        read_json(&path)
    }
}

/// A wallet key that passed secret verification.
pub struct UnlockedKey {
    wallet_id: String,
    signing_key: SigningKey,
}

impl std::fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("wallet_id", &self.wallet_id)
            .finish_non_exhaustive()
    }
}

impl UnlockedKey {
    pub fn wallet_id(&self) -> &str {
        &self.wallet_id
    }

    pub fn public_key(&self) -> String {
        public_key_hex(&self.signing_key)
    }

    /// Sign a hex-encoded 32-byte digest, returning hex `r || s`.
    pub fn sign_hash(&self, message_hex: &str) -> KeyStoreResult<String> {
        let digest = hex::decode(message_hex.trim_start_matches("0x"))
            .map_err(|e| KeyStoreError::InvalidMessage(e.to_string()))?;
        if digest.len() != 32 {
            return Err(KeyStoreError::InvalidMessage(format!(
                "expected 32 bytes, got {}",
                digest.len()
            )));
        }

        let signature: Signature = self
            .signing_key
            .sign_prehash(&digest)
            .map_err(|e| KeyStoreError::Signing(e.to_string()))?;
        Ok(hex::encode(signature.to_bytes()))
    }

    /// Fill every signature slot of a ledger-built transaction.
    pub fn sign_raw_transaction(&self, raw_tx: &mut RawTransaction) -> KeyStoreResult<()> {
        if raw_tx.signatures.is_empty() {
            return Err(KeyStoreError::InvalidMessage(
                "transaction has no signature slots".to_string(),
            ));
        }
        for slots in raw_tx.signatures.values_mut() {
            for slot in slots.iter_mut() {
                slot.signature = self.sign_hash(&slot.message)?;
            }
        }
        Ok(())
    }
}

fn public_key_hex(signing_key: &SigningKey) -> String {
    hex::encode(signing_key.verifying_key().to_encoded_point(true).as_bytes())
}

fn secret_digest(wallet_id: &str, secret: &str) -> KeyStoreResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(wallet_id.as_bytes())
        .map_err(|e| KeyStoreError::KeyEncoding(e.to_string()))?;
    mac.update(secret.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> KeyStoreResult<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write to a temp file and rename over the target.
fn write_json<T: Serialize>(path: &Path, value: &T) -> KeyStoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&temp_path, path)?;
    Ok(())
}
