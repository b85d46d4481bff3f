// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use crate::config::Capability;
use crate::keystore::KeyStoreError;
use crate::ledger::LedgerError;
use crate::storage::StoreError;

/// Relay status codes shared with the control plane.
pub mod status {
    pub const SUCCESS: u64 = 200;
    pub const UNKNOWN_EXCEPTION: u64 = 2002;
    pub const ACCOUNT_NOT_FOUND: u64 = 2003;
    pub const SIGN_FAILED: u64 = 2004;
    pub const APP_ID_INCORRECT: u64 = 3001;
    pub const ABILITY_DISABLED: u64 = 3002;
    pub const SUMMARY_SETTING_FAILED: u64 = 3003;
    pub const TIMER_NOT_STARTED: u64 = 3004;
    pub const NOT_TRUSTED: u64 = 3005;
}

/// Error returned to a relay caller as `{status, msg}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayError {
    pub status: u64,
    pub message: String,
}

pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    pub fn new(status: u64, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(status::UNKNOWN_EXCEPTION, message)
    }

    pub fn account_not_found(message: impl Into<String>) -> Self {
        Self::new(status::ACCOUNT_NOT_FOUND, message)
    }

    pub fn sign_failed(message: impl Into<String>) -> Self {
        Self::new(status::SIGN_FAILED, message)
    }

    pub fn app_id_incorrect() -> Self {
        Self::new(status::APP_ID_INCORRECT, "appID is incorrect")
    }

    pub fn ability_disabled(capability: Capability) -> Self {
        Self::new(
            status::ABILITY_DISABLED,
            format!("the node has disabled [{}] ability", capability.label()),
        )
    }

    pub fn summary_setting_failed(message: impl Into<String>) -> Self {
        Self::new(status::SUMMARY_SETTING_FAILED, message)
    }

    pub fn timer_not_started() -> Self {
        Self::new(status::TIMER_NOT_STARTED, "summary task timer is not start")
    }

    pub fn not_trusted(address: &str) -> Self {
        Self::new(
            status::NOT_TRUSTED,
            format!("{address} is not in trust address list"),
        )
    }
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.status, self.message)
    }
}

impl std::error::Error for RelayError {}

impl From<LedgerError> for RelayError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(what) => Self::account_not_found(format!("{what} not found")),
            LedgerError::Rejected { status, message } => Self::new(status, message),
            other => Self::unknown(other.to_string()),
        }
    }
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        Self::unknown(err.to_string())
    }
}

impl From<KeyStoreError> for RelayError {
    fn from(err: KeyStoreError) -> Self {
        match err {
            KeyStoreError::InvalidMessage(_) | KeyStoreError::Signing(_) => {
                Self::sign_failed(err.to_string())
            }
            other => Self::unknown(other.to_string()),
        }
    }
}
