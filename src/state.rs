// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::info;

use crate::config::NodeConfig;
use crate::consolidation::{hydrate_and_validate, Executor, PrecheckError, Scheduler, TaskStore};
use crate::identity::NodeIdentity;
use crate::keystore::{KeyStore, KeyStoreResult};
use crate::ledger::LedgerApi;
use crate::models::{ConsolidationTask, OperateType};
use crate::storage::NodeDatabase;
use crate::trust::{TrustGuard, TrustList, TrustListError, TrustSync};

/// Everything the relay handlers and the consolidation engine share.
pub struct NodeState {
    pub config: NodeConfig,
    pub db: Arc<NodeDatabase>,
    pub ledger: Arc<dyn LedgerApi>,
    pub keystore: KeyStore,
    pub trust: TrustGuard,
    pub tasks: Arc<TaskStore>,
    pub scheduler: Scheduler,
    pub identity: NodeIdentity,
    /// Secrets of wallets unlocked by the operator, by wallet id.
    unlocked: RwLock<HashMap<String, String>>,
}

impl NodeState {
    pub fn new(
        config: NodeConfig,
        db: Arc<NodeDatabase>,
        ledger: Arc<dyn LedgerApi>,
        keystore: KeyStore,
        identity: NodeIdentity,
    ) -> Self {
        let tasks = Arc::new(TaskStore::new());
        let executor = Arc::new(Executor::new(
            db.clone(),
            ledger.clone(),
            keystore.clone(),
            tasks.clone(),
        ));

        Self {
            config,
            trust: TrustGuard::new(db.clone()),
            db,
            ledger,
            keystore,
            tasks,
            scheduler: Scheduler::new(executor),
            identity,
            unlocked: RwLock::new(HashMap::new()),
        }
    }

    /// Verify `secret` for `wallet_id` and remember it for later relay calls.
    pub fn unlock_wallet(&self, wallet_id: &str, secret: &str) -> KeyStoreResult<()> {
        self.keystore.verify_secret(wallet_id, secret)?;
        self.unlocked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(wallet_id.to_string(), secret.to_string());
        info!(wallet_id = %wallet_id, "Wallet unlocked");
        Ok(())
    }

    /// `given` when non-empty, else the cached secret for the wallet, else empty.
    pub fn resolve_secret(&self, wallet_id: &str, given: &str) -> String {
        if !given.is_empty() {
            return given.to_string();
        }
        self.unlocked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(wallet_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the trust address list with the contents of `path`.
    pub fn apply_trust_file(&self, path: &Path) -> Result<TrustSync, TrustListError> {
        let list = TrustList::from_file(path)?;
        self.trust.sync(&list)
    }

    /// Validate `task`, merge it into the active task and make sure the timer
    /// is running. Returns `true` when a new timer was started.
    ///
    /// Nothing changes when validation fails.
    pub async fn start_consolidation(
        &self,
        mut task: ConsolidationTask,
        mode: OperateType,
        interval: Duration,
    ) -> Result<bool, PrecheckError> {
        for wallet_task in &mut task.wallets {
            wallet_task.password = self.resolve_secret(&wallet_task.wallet_id, &wallet_task.password);
        }

        hydrate_and_validate(&mut task, &self.db, self.ledger.as_ref()).await?;

        match mode {
            OperateType::Reset => self.tasks.reset(task),
            OperateType::Add => self.tasks.append(task),
        }

        Ok(self.scheduler.start(interval))
    }

    /// Validate `task` and merge it into the active one.
    pub async fn append_consolidation(&self, mut task: ConsolidationTask) -> Result<(), PrecheckError> {
        for wallet_task in &mut task.wallets {
            wallet_task.password = self.resolve_secret(&wallet_task.wallet_id, &wallet_task.password);
        }

        hydrate_and_validate(&mut task, &self.db, self.ledger.as_ref()).await?;
        self.tasks.append(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountTask, WalletTask};
    use crate::testing::{account, node_state, summary_setting, MockLedger};

    #[test]
    fn unlock_caches_only_verified_secrets() {
        let (state, _dir) = node_state(MockLedger::new());
        let wallet = state.keystore.create_wallet("main", "pw").unwrap();

        assert!(state.unlock_wallet(&wallet.wallet_id, "nope").is_err());
        assert_eq!(state.resolve_secret(&wallet.wallet_id, ""), "");

        state.unlock_wallet(&wallet.wallet_id, "pw").unwrap();
        assert_eq!(state.resolve_secret(&wallet.wallet_id, ""), "pw");
        assert_eq!(state.resolve_secret(&wallet.wallet_id, "given"), "given");
    }

    #[test]
    fn trust_file_turns_on_the_guard() {
        let (state, dir) = node_state(MockLedger::new());
        assert!(state.trust.is_allowed("0xstranger", "ETH"));

        let path = dir.path().join("trust.json");
        std::fs::write(
            &path,
            r#"{"enableTrustAddress": true, "trustAddressList": [{"address": "0xfriend", "symbol": "ETH"}]}"#,
        )
        .unwrap();
        state.apply_trust_file(&path).unwrap();

        assert!(state.trust.is_allowed("0xfriend", "ETH"));
        assert!(!state.trust.is_allowed("0xstranger", "ETH"));
    }

    #[tokio::test]
    async fn failed_precheck_leaves_task_untouched() {
        let (state, _dir) = node_state(
            MockLedger::new()
                .with_account(account("A1", "W1", "ETH", "10"))
                .with_account(account("A2", "W1", "ETH", "10")),
        );
        state
            .db
            .save_summary_setting(&summary_setting("W1", "A1", "5"))
            .unwrap();

        let task = |id: &str| ConsolidationTask {
            wallets: vec![WalletTask {
                wallet_id: "W1".to_string(),
                password: "pw".to_string(),
                wallet: None,
                accounts: vec![AccountTask {
                    account_id: id.to_string(),
                    ..Default::default()
                }],
            }],
        };

        state.tasks.reset(task("A1"));
        let before = state.tasks.snapshot();

        let err = state.append_consolidation(task("A2")).await.unwrap_err();
        assert!(matches!(err, PrecheckError::SettingMissing(_)));
        assert_eq!(state.tasks.snapshot(), before);

        let err = state
            .start_consolidation(task("A2"), OperateType::Reset, Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, PrecheckError::SettingMissing(_)));
        assert_eq!(state.tasks.snapshot(), before);
        assert!(!state.scheduler.is_running());
    }
}
