// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use custody_node::config::{ConfigError, NodeConfig};
use custody_node::identity::{IdentityError, NodeIdentity};
use custody_node::keystore::KeyStore;
use custody_node::ledger::{HttpLedgerClient, LedgerError};
use custody_node::models::{ConsolidationTask, OperateType};
use custody_node::relay::{Supervisor, WsConnector};
use custody_node::state::NodeState;
use custody_node::storage::{NodeDatabase, NodePaths, StoreError};
use custody_node::trust::TrustListError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum BootError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("storage: {0}")]
    Store(#[from] StoreError),

    #[error("node identity: {0}")]
    Identity(#[from] IdentityError),

    #[error("ledger client: {0}")]
    Ledger(#[from] LedgerError),

    #[error("trust address list: {0}")]
    TrustList(#[from] TrustListError),

    #[error("signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Custody node failed to start");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run() -> Result<(), BootError> {
    let config = NodeConfig::from_env()?;
    let paths = NodePaths::new(&config.data_dir);

    let db = Arc::new(NodeDatabase::open(&paths.node_db())?);
    let identity = NodeIdentity::load_or_regenerate(&db, config.regenerate_identity.as_deref())?;
    let ledger = HttpLedgerClient::new(
        config.ledger_url.as_str(),
        &config.app_id,
        &config.app_key,
        config.request_timeout,
    )?;
    let keystore = KeyStore::new(paths);

    info!(
        node_id = %identity.node_id(),
        node_name = %config.local_name,
        data_dir = %config.data_dir.display(),
        "Custody node starting"
    );

    let state = Arc::new(NodeState::new(
        config,
        db,
        Arc::new(ledger),
        keystore,
        identity,
    ));

    // A trust list that cannot be applied stops the boot.
    if let Some(path) = state.config.trust_address_file.as_deref() {
        state.apply_trust_file(path)?;
    }

    if let Some(path) = state.config.summary_task_file.clone() {
        start_boot_task(&state, &path).await;
    }

    let shutdown = CancellationToken::new();
    let supervisor = match state.config.trusted_server_url() {
        Some(url) => {
            let connector = WsConnector::new(url.as_str(), state.config.request_timeout, state.clone());
            let supervisor = Supervisor::new(connector, state.config.reconnect_wait);
            Some(tokio::spawn(supervisor.run(shutdown.clone())))
        }
        None => {
            info!("TRUSTED_SERVER not set, relay disabled");
            None
        }
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    state.scheduler.stop();
    if let Some(handle) = supervisor {
        let _ = handle.await;
    }

    info!("Custody node stopped");
    Ok(())
}

/// Start the task described by the boot file in reset mode. Failures are
/// logged and leave the node running without a consolidation timer.
async fn start_boot_task(state: &NodeState, path: &Path) {
    let task = match std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str::<ConsolidationTask>(&raw).map_err(|e| e.to_string()))
    {
        Ok(task) => task,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read consolidation task file");
            return;
        }
    };

    for wallet_task in task.wallets.iter().filter(|w| !w.password.is_empty()) {
        if let Err(e) = state.unlock_wallet(&wallet_task.wallet_id, &wallet_task.password) {
            warn!(wallet_id = %wallet_task.wallet_id, error = %e, "Failed to unlock wallet from task file");
        }
    }

    let interval = state.config.summary_period;
    match state
        .start_consolidation(task, OperateType::Reset, interval)
        .await
    {
        Ok(_) => info!(
            path = %path.display(),
            interval_secs = interval.as_secs(),
            "Consolidation task started from file"
        ),
        Err(e) => error!(path = %path.display(), error = %e, "Consolidation task file rejected"),
    }
}
