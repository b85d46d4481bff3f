// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The active consolidation task, shared by the scheduler and relay handlers.
//!
//! All access goes through one reader/writer lock that is only held for the
//! mutation or the copy, never across ledger or signing calls.

use std::sync::{PoisonError, RwLock};

use tracing::info;

use crate::models::{ConsolidationTask, LocalWallet};

#[derive(Debug, Default)]
pub struct TaskStore {
    inner: RwLock<ConsolidationTask>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active task wholesale.
    pub fn reset(&self, task: ConsolidationTask) {
        let mut active = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *active = task;
        info!(wallets = active.wallets.len(), "Consolidation task reset");
    }

    /// Merge `task` into the active one.
    ///
    /// Known wallets gain new accounts; known accounts gain (or overwrite)
    /// contract entries. Anything unknown is appended as given.
    pub fn append(&self, task: ConsolidationTask) {
        let mut active = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        for incoming in task.wallets {
            let Some(index) = active
                .wallets
                .iter()
                .position(|w| w.wallet_id == incoming.wallet_id)
            else {
                info!(wallet_id = %incoming.wallet_id, "Consolidation wallet task appended");
                active.wallets.push(incoming);
                continue;
            };
            let existing = &mut active.wallets[index];

            if existing.password.is_empty() && !incoming.password.is_empty() {
                existing.password = incoming.password;
            }

            for account in incoming.accounts {
                match existing
                    .accounts
                    .iter()
                    .position(|a| a.account_id == account.account_id)
                {
                    Some(pos) => existing.accounts[pos].contracts.extend(account.contracts),
                    None => {
                        info!(
                            wallet_id = %existing.wallet_id,
                            account_id = %account.account_id,
                            "Consolidation account task appended"
                        );
                        existing.accounts.push(account);
                    }
                }
            }
        }
    }

    /// Drop one account, or the whole wallet when `account_id` is empty.
    /// Unknown ids leave the task untouched.
    pub fn remove(&self, wallet_id: &str, account_id: &str) {
        let mut active = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let Some(index) = active.wallets.iter().position(|w| w.wallet_id == wallet_id) else {
            return;
        };

        if account_id.is_empty() {
            active.wallets.remove(index);
            info!(wallet_id = %wallet_id, "Consolidation wallet task removed");
            return;
        }

        let accounts = &mut active.wallets[index].accounts;
        if let Some(pos) = accounts.iter().position(|a| a.account_id == account_id) {
            accounts.remove(pos);
            info!(wallet_id = %wallet_id, account_id = %account_id, "Consolidation account task removed");
        }
    }

    /// Owned copy for iteration outside the lock.
    pub fn snapshot(&self) -> ConsolidationTask {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The active task with secrets and wallet handles stripped.
    pub fn current_redacted(&self) -> ConsolidationTask {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .redacted()
    }

    /// Remember a resolved wallet handle so later ticks skip the lookup.
    pub fn cache_wallet(&self, wallet: LocalWallet) {
        let mut active = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = active
            .wallets
            .iter_mut()
            .find(|w| w.wallet_id == wallet.wallet_id)
        {
            task.wallet = Some(wallet);
        }
    }
}
