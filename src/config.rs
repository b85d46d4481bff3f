// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup and passed
//! around as an immutable [`NodeConfig`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for keys and the node database | `./data` |
//! | `LEDGER_URL` | Remote ledger service base URL | Required |
//! | `APP_ID` | Application identifier, checked on every relay call | Required |
//! | `APP_KEY` | Application key presented to the ledger service | Required |
//! | `LOCAL_NAME` | Display name announced to the control plane | `custody-node` |
//! | `TRUSTED_SERVER` | Control plane link address | Unset (relay disabled) |
//! | `ENABLE_SSL` | Use `wss://` when `TRUSTED_SERVER` has no scheme | `false` |
//! | `ENABLE_REMOTE_TRANSFER` | Allow relayed transfers and signing | `false` |
//! | `ENABLE_EDIT_CONSOLIDATION_SETTINGS` | Allow relayed setting edits | `false` |
//! | `ENABLE_EXECUTE_CONSOLIDATION_TASK` | Allow relayed task control | `false` |
//! | `SUMMARY_PERIOD_SECS` | Default consolidation tick interval | `3600` |
//! | `SUMMARY_TASK_FILE` | Task JSON started in reset mode at boot | Unset |
//! | `TRUST_ADDRESS_FILE` | Trust address list applied at boot (see `crate::trust`) | Unset |
//! | `REGENERATE_IDENTITY` | Current node id, to confirm replacing the node identity | Unset |
//! | `REQUEST_TIMEOUT_SECS` | Ledger request and link handshake timeout | `60` |
//! | `RECONNECT_WAIT_SECS` | Backoff between link reconnect attempts | `5` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const LEDGER_URL_ENV: &str = "LEDGER_URL";
pub const APP_ID_ENV: &str = "APP_ID";
pub const APP_KEY_ENV: &str = "APP_KEY";
pub const LOCAL_NAME_ENV: &str = "LOCAL_NAME";
pub const TRUSTED_SERVER_ENV: &str = "TRUSTED_SERVER";
pub const ENABLE_SSL_ENV: &str = "ENABLE_SSL";
pub const ENABLE_REMOTE_TRANSFER_ENV: &str = "ENABLE_REMOTE_TRANSFER";
pub const ENABLE_EDIT_CONSOLIDATION_SETTINGS_ENV: &str = "ENABLE_EDIT_CONSOLIDATION_SETTINGS";
pub const ENABLE_EXECUTE_CONSOLIDATION_TASK_ENV: &str = "ENABLE_EXECUTE_CONSOLIDATION_TASK";
pub const SUMMARY_PERIOD_ENV: &str = "SUMMARY_PERIOD_SECS";
pub const SUMMARY_TASK_FILE_ENV: &str = "SUMMARY_TASK_FILE";
pub const TRUST_ADDRESS_FILE_ENV: &str = "TRUST_ADDRESS_FILE";
pub const REGENERATE_IDENTITY_ENV: &str = "REGENERATE_IDENTITY";
pub const REQUEST_TIMEOUT_ENV: &str = "REQUEST_TIMEOUT_SECS";
pub const RECONNECT_WAIT_ENV: &str = "RECONNECT_WAIT_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_LOCAL_NAME: &str = "custody-node";
const DEFAULT_SUMMARY_PERIOD_SECS: u64 = 3600;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RECONNECT_WAIT_SECS: u64 = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is empty")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("{name} is not a valid URL ({value}): {reason}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Relay abilities that an operator can switch on individually.
///
/// Every sensitive relay method names exactly one of these; the dispatcher
/// checks it before the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    RemoteTransfer,
    EditConsolidationSettings,
    ExecuteConsolidationTask,
}

impl Capability {
    /// Human-readable ability name used in rejection messages.
    pub fn label(&self) -> &'static str {
        match self {
            Capability::RemoteTransfer => "transfer",
            Capability::EditConsolidationSettings => "edit summary settings",
            Capability::ExecuteConsolidationTask => "execute summary task",
        }
    }
}

/// Capability flags as loaded from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub remote_transfer: bool,
    pub edit_consolidation_settings: bool,
    pub execute_consolidation_task: bool,
}

impl Capabilities {
    pub fn is_enabled(&self, capability: Capability) -> bool {
        match capability {
            Capability::RemoteTransfer => self.remote_transfer,
            Capability::EditConsolidationSettings => self.edit_consolidation_settings,
            Capability::ExecuteConsolidationTask => self.execute_consolidation_task,
        }
    }

    pub fn all() -> Self {
        Self {
            remote_transfer: true,
            edit_consolidation_settings: true,
            execute_consolidation_task: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub ledger_url: Url,
    pub app_id: String,
    pub app_key: String,
    pub local_name: String,
    /// Link URL with its `ws`/`wss` scheme already resolved.
    pub trusted_server: Option<Url>,
    pub enable_ssl: bool,
    pub capabilities: Capabilities,
    pub summary_period: Duration,
    pub summary_task_file: Option<PathBuf>,
    pub trust_address_file: Option<PathBuf>,
    /// Node id the operator confirms replacing.
    pub regenerate_identity: Option<String>,
    pub request_timeout: Duration,
    pub reconnect_wait: Duration,
}

impl NodeConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    /// Load configuration through an arbitrary lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let flag = |name: &'static str| -> Result<bool, ConfigError> {
            match get(name) {
                None => Ok(false),
                Some(value) => parse_bool(&value).ok_or(ConfigError::Invalid { name, value }),
            }
        };

        let secs = |name: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match get(name) {
                None => Ok(Duration::from_secs(default)),
                Some(value) => match value.parse::<u64>() {
                    Ok(n) if n > 0 => Ok(Duration::from_secs(n)),
                    _ => Err(ConfigError::Invalid { name, value }),
                },
            }
        };

        let enable_ssl = flag(ENABLE_SSL_ENV)?;
        let ledger_url = parse_url(LEDGER_URL_ENV, &required(LEDGER_URL_ENV)?, &["http", "https"])?;
        let trusted_server = get(TRUSTED_SERVER_ENV)
            .map(|server| {
                let server = if server.contains("://") {
                    server
                } else {
                    let scheme = if enable_ssl { "wss" } else { "ws" };
                    format!("{scheme}://{server}")
                };
                parse_url(TRUSTED_SERVER_ENV, &server, &["ws", "wss"])
            })
            .transpose()?;

        Ok(Self {
            data_dir: get(DATA_DIR_ENV)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
                .into(),
            ledger_url,
            app_id: required(APP_ID_ENV)?,
            app_key: required(APP_KEY_ENV)?,
            local_name: get(LOCAL_NAME_ENV).unwrap_or_else(|| DEFAULT_LOCAL_NAME.to_string()),
            trusted_server,
            enable_ssl,
            capabilities: Capabilities {
                remote_transfer: flag(ENABLE_REMOTE_TRANSFER_ENV)?,
                edit_consolidation_settings: flag(ENABLE_EDIT_CONSOLIDATION_SETTINGS_ENV)?,
                execute_consolidation_task: flag(ENABLE_EXECUTE_CONSOLIDATION_TASK_ENV)?,
            },
            summary_period: secs(SUMMARY_PERIOD_ENV, DEFAULT_SUMMARY_PERIOD_SECS)?,
            summary_task_file: get(SUMMARY_TASK_FILE_ENV).map(PathBuf::from),
            trust_address_file: get(TRUST_ADDRESS_FILE_ENV).map(PathBuf::from),
            regenerate_identity: get(REGENERATE_IDENTITY_ENV),
            request_timeout: secs(REQUEST_TIMEOUT_ENV, DEFAULT_REQUEST_TIMEOUT_SECS)?,
            reconnect_wait: secs(RECONNECT_WAIT_ENV, DEFAULT_RECONNECT_WAIT_SECS)?,
        })
    }

    /// The link URL for the control plane. `ENABLE_SSL` picks the scheme
    /// when the configured address has none.
    pub fn trusted_server_url(&self) -> Option<&Url> {
        self.trusted_server.as_ref()
    }

    /// A configuration suitable for unit tests.
    #[cfg(test)]
    pub fn for_tests(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ledger_url: Url::parse("http://ledger.test").expect("static test URL"),
            app_id: "app-test".to_string(),
            app_key: "key-test".to_string(),
            local_name: "test-node".to_string(),
            trusted_server: None,
            enable_ssl: false,
            capabilities: Capabilities::all(),
            summary_period: Duration::from_secs(DEFAULT_SUMMARY_PERIOD_SECS),
            summary_task_file: None,
            trust_address_file: None,
            regenerate_identity: None,
            request_timeout: Duration::from_secs(5),
            reconnect_wait: Duration::from_millis(20),
        }
    }
}

fn parse_url(name: &'static str, value: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
        reason,
    };
    let url: Url = value
        .parse()
        .map_err(|e: url::ParseError| invalid(e.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(format!("scheme must be one of {}", schemes.join(", "))));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const BASE: [(&str, &str); 3] = [
        (LEDGER_URL_ENV, "https://ledger.example"),
        (APP_ID_ENV, "app-1"),
        (APP_KEY_ENV, "secret-key"),
    ];

    #[test]
    fn defaults_apply_when_optional_vars_missing() {
        let config = NodeConfig::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.local_name, "custody-node");
        assert_eq!(config.summary_period, Duration::from_secs(3600));
        assert_eq!(config.reconnect_wait, Duration::from_secs(5));
        assert_eq!(config.capabilities, Capabilities::default());
        assert!(config.trusted_server_url().is_none());
        assert!(config.trust_address_file.is_none());
        assert!(config.regenerate_identity.is_none());
    }

    #[test]
    fn operator_files_and_confirmation_are_read() {
        let mut pairs = BASE.to_vec();
        pairs.push((TRUST_ADDRESS_FILE_ENV, "/etc/node/trust.json"));
        pairs.push((REGENERATE_IDENTITY_ENV, " abc123 "));
        let config = NodeConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.trust_address_file,
            Some(PathBuf::from("/etc/node/trust.json"))
        );
        assert_eq!(config.regenerate_identity.as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_app_id_is_rejected() {
        let err = NodeConfig::from_lookup(lookup(&[
            (LEDGER_URL_ENV, "https://ledger.example"),
            (APP_KEY_ENV, "k"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing(APP_ID_ENV));
    }

    #[test]
    fn capability_flags_parse() {
        let mut pairs = BASE.to_vec();
        pairs.push((ENABLE_REMOTE_TRANSFER_ENV, "TRUE"));
        pairs.push((ENABLE_EXECUTE_CONSOLIDATION_TASK_ENV, "1"));
        let config = NodeConfig::from_lookup(lookup(&pairs)).unwrap();

        assert!(config.capabilities.is_enabled(Capability::RemoteTransfer));
        assert!(config.capabilities.is_enabled(Capability::ExecuteConsolidationTask));
        assert!(!config
            .capabilities
            .is_enabled(Capability::EditConsolidationSettings));
    }

    #[test]
    fn malformed_flag_is_an_error() {
        let mut pairs = BASE.to_vec();
        pairs.push((ENABLE_SSL_ENV, "maybe"));
        let err = NodeConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name, .. } if name == ENABLE_SSL_ENV));
    }

    #[test]
    fn zero_period_is_an_error() {
        let mut pairs = BASE.to_vec();
        pairs.push((SUMMARY_PERIOD_ENV, "0"));
        assert!(NodeConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn trusted_server_scheme_follows_ssl_flag() {
        let mut pairs = BASE.to_vec();
        pairs.push((TRUSTED_SERVER_ENV, "relay.example:8443"));
        pairs.push((ENABLE_SSL_ENV, "yes"));
        let config = NodeConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.trusted_server_url().map(Url::as_str),
            Some("wss://relay.example:8443/")
        );

        let mut pairs = BASE.to_vec();
        pairs.push((TRUSTED_SERVER_ENV, "ws://10.0.0.2:9000/link"));
        let config = NodeConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(
            config.trusted_server_url().map(Url::as_str),
            Some("ws://10.0.0.2:9000/link")
        );
    }

    #[test]
    fn ledger_url_is_parsed_at_load() {
        let config = NodeConfig::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(config.ledger_url.host_str(), Some("ledger.example"));

        for bad in ["not a url", "ftp://ledger.example", "ledger.example/api"] {
            let err = NodeConfig::from_lookup(lookup(&[
                (LEDGER_URL_ENV, bad),
                (APP_ID_ENV, "app-1"),
                (APP_KEY_ENV, "k"),
            ]))
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidUrl { name, .. } if name == LEDGER_URL_ENV),
                "{bad}"
            );
        }
    }

    #[test]
    fn malformed_trusted_server_is_rejected_at_load() {
        for bad in ["http://relay.example", "relay example:99", "ws://"] {
            let mut pairs = BASE.to_vec();
            pairs.push((TRUSTED_SERVER_ENV, bad));
            let err = NodeConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidUrl { name, .. } if name == TRUSTED_SERVER_ENV),
                "{bad}"
            );
        }
    }
}
