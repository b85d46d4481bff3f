// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Settings pre-check run before a task is activated.
//!
//! Every referenced account must exist on the ledger, belong to the wallet it
//! is listed under and have a persisted [`SummarySetting`] with a collection
//! address. The check also hydrates each account's default setting from the
//! persisted record and validates any fee-support account.
//!
//! The check works on a caller-owned copy of the task, so a failure never
//! touches the active task.

use crate::ledger::{LedgerApi, LedgerError};
use crate::models::{AccountTask, ConsolidationTask};
use crate::storage::{NodeDatabase, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum PrecheckError {
    #[error("consolidation task account {0} can not be found")]
    AccountNotFound(String),

    #[error("account {account_id} does not belong to wallet {wallet_id}")]
    WalletMismatch {
        account_id: String,
        wallet_id: String,
    },

    #[error("consolidation account {0} has no summary setting")]
    SettingMissing(String),

    #[error("consolidation account {0} has an empty summary address")]
    SumAddressEmpty(String),

    #[error("fees support account {0} can not be found")]
    FeesSupportNotFound(String),

    #[error("fees support account {fees_account} is not in wallet {wallet_id}")]
    FeesSupportWalletMismatch {
        fees_account: String,
        wallet_id: String,
    },

    #[error("switch symbol {0} can not be found")]
    SwitchSymbolNotFound(String),

    #[error("fees support account {fees_account} symbol does not match {expected}")]
    FeesSupportSymbolMismatch {
        fees_account: String,
        expected: String,
    },

    #[error("fees support account {0} pays fees in a token but has no contract address")]
    FeesSupportContractMissing(String),

    #[error(transparent)]
    Ledger(LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validate `task` and fill in account defaults from persisted settings.
pub async fn hydrate_and_validate(
    task: &mut ConsolidationTask,
    db: &NodeDatabase,
    ledger: &dyn LedgerApi,
) -> Result<(), PrecheckError> {
    for wallet in &mut task.wallets {
        for account_task in &mut wallet.accounts {
            check_account(&wallet.wallet_id, account_task, db, ledger).await?;
        }
    }
    Ok(())
}

async fn check_account(
    wallet_id: &str,
    account_task: &mut AccountTask,
    db: &NodeDatabase,
    ledger: &dyn LedgerApi,
) -> Result<(), PrecheckError> {
    let account_id = account_task.account_id.clone();

    let account = ledger
        .get_account(&account_id)
        .await
        .map_err(|e| match e {
            LedgerError::NotFound(_) => PrecheckError::AccountNotFound(account_id.clone()),
            other => PrecheckError::Ledger(other),
        })?;

    if account.wallet_id != wallet_id {
        return Err(PrecheckError::WalletMismatch {
            account_id,
            wallet_id: wallet_id.to_string(),
        });
    }

    let persisted = db
        .get_summary_setting(&account_id)?
        .ok_or_else(|| PrecheckError::SettingMissing(account_id.clone()))?;

    if persisted.sum_address.is_empty() {
        return Err(PrecheckError::SumAddressEmpty(account_id));
    }

    // The collection address always comes from the persisted record.
    match account_task.summary_setting.as_mut() {
        Some(setting) => setting.sum_address = persisted.sum_address.clone(),
        None => account_task.summary_setting = Some(persisted),
    }

    let Some(fees) = account_task
        .fees_support_account
        .as_ref()
        .filter(|f| !f.account_id.is_empty())
    else {
        return Ok(());
    };

    let fees_account = ledger
        .get_account(&fees.account_id)
        .await
        .map_err(|e| match e {
            LedgerError::NotFound(_) => PrecheckError::FeesSupportNotFound(fees.account_id.clone()),
            other => PrecheckError::Ledger(other),
        })?;

    if fees_account.wallet_id != account.wallet_id {
        return Err(PrecheckError::FeesSupportWalletMismatch {
            fees_account: fees.account_id.clone(),
            wallet_id: account.wallet_id,
        });
    }

    let expected_symbol = match account_task
        .switch_symbol
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        Some(switch) => {
            ledger.get_symbol(switch).await.map_err(|e| match e {
                LedgerError::NotFound(_) => PrecheckError::SwitchSymbolNotFound(switch.to_string()),
                other => PrecheckError::Ledger(other),
            })?;
            switch.to_string()
        }
        None => account.symbol.clone(),
    };

    if fees_account.symbol != expected_symbol {
        return Err(PrecheckError::FeesSupportSymbolMismatch {
            fees_account: fees.account_id.clone(),
            expected: expected_symbol,
        });
    }

    if fees.is_token_contract && fees.contract_address.is_empty() {
        return Err(PrecheckError::FeesSupportContractMissing(
            fees.account_id.clone(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeesSupportAccount, SummarySetting, WalletTask};
    use crate::testing::{account, summary_setting, MockLedger};

    fn temp_db() -> (NodeDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = NodeDatabase::open(&dir.path().join("node.redb")).unwrap();
        (db, dir)
    }

    fn task_for(wallet_id: &str, account_task: AccountTask) -> ConsolidationTask {
        ConsolidationTask {
            wallets: vec![WalletTask {
                wallet_id: wallet_id.to_string(),
                password: "pw".to_string(),
                wallet: None,
                accounts: vec![account_task],
            }],
        }
    }

    fn account_task(id: &str) -> AccountTask {
        AccountTask {
            account_id: id.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_setting_fails() {
        let (db, _dir) = temp_db();
        let ledger = MockLedger::new().with_account(account("A1", "W1", "ETH", "10"));

        let mut task = task_for("W1", account_task("A1"));
        let err = hydrate_and_validate(&mut task, &db, &ledger)
            .await
            .unwrap_err();
        assert!(matches!(err, PrecheckError::SettingMissing(id) if id == "A1"));
    }

    #[tokio::test]
    async fn unknown_account_fails() {
        let (db, _dir) = temp_db();
        let ledger = MockLedger::new();

        let mut task = task_for("W1", account_task("A1"));
        let err = hydrate_and_validate(&mut task, &db, &ledger)
            .await
            .unwrap_err();
        assert!(matches!(err, PrecheckError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn account_in_other_wallet_fails() {
        let (db, _dir) = temp_db();
        db.save_summary_setting(&summary_setting("W2", "A1", "5")).unwrap();
        let ledger = MockLedger::new().with_account(account("A1", "W2", "ETH", "10"));

        let mut task = task_for("W1", account_task("A1"));
        assert!(matches!(
            hydrate_and_validate(&mut task, &db, &ledger).await,
            Err(PrecheckError::WalletMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn default_setting_is_hydrated() {
        let (db, _dir) = temp_db();
        db.save_summary_setting(&summary_setting("W1", "A1", "5")).unwrap();
        let ledger = MockLedger::new().with_account(account("A1", "W1", "ETH", "10"));

        let mut task = task_for("W1", account_task("A1"));
        hydrate_and_validate(&mut task, &db, &ledger).await.unwrap();

        let setting = task.wallets[0].accounts[0].summary_setting.as_ref().unwrap();
        assert_eq!(setting.threshold, "5");
        assert_eq!(setting.sum_address, "sum-A1");
    }

    #[tokio::test]
    async fn caller_setting_keeps_values_but_takes_persisted_address() {
        let (db, _dir) = temp_db();
        db.save_summary_setting(&summary_setting("W1", "A1", "5")).unwrap();
        let ledger = MockLedger::new().with_account(account("A1", "W1", "ETH", "10"));

        let mut at = account_task("A1");
        at.summary_setting = Some(SummarySetting {
            threshold: "1".to_string(),
            sum_address: "attacker".to_string(),
            ..Default::default()
        });
        let mut task = task_for("W1", at);
        hydrate_and_validate(&mut task, &db, &ledger).await.unwrap();

        let setting = task.wallets[0].accounts[0].summary_setting.as_ref().unwrap();
        assert_eq!(setting.threshold, "1");
        assert_eq!(setting.sum_address, "sum-A1");
    }

    #[tokio::test]
    async fn fees_support_must_share_wallet_and_symbol() {
        let (db, _dir) = temp_db();
        db.save_summary_setting(&summary_setting("W1", "A1", "5")).unwrap();
        let ledger = MockLedger::new()
            .with_account(account("A1", "W1", "ETH", "10"))
            .with_account(account("F1", "W2", "ETH", "1"))
            .with_account(account("F2", "W1", "TRX", "1"))
            .with_account(account("F3", "W1", "ETH", "1"));

        let with_fees = |fees_id: &str| {
            let mut at = account_task("A1");
            at.fees_support_account = Some(FeesSupportAccount {
                account_id: fees_id.to_string(),
                ..Default::default()
            });
            task_for("W1", at)
        };

        let mut task = with_fees("F1");
        assert!(matches!(
            hydrate_and_validate(&mut task, &db, &ledger).await,
            Err(PrecheckError::FeesSupportWalletMismatch { .. })
        ));

        let mut task = with_fees("F2");
        assert!(matches!(
            hydrate_and_validate(&mut task, &db, &ledger).await,
            Err(PrecheckError::FeesSupportSymbolMismatch { .. })
        ));

        let mut task = with_fees("F3");
        hydrate_and_validate(&mut task, &db, &ledger).await.unwrap();
    }

    #[tokio::test]
    async fn switch_symbol_must_exist_and_match() {
        let (db, _dir) = temp_db();
        db.save_summary_setting(&summary_setting("W1", "A1", "5")).unwrap();
        let ledger = MockLedger::new()
            .with_account(account("A1", "W1", "ETH", "10"))
            .with_account(account("F1", "W1", "BSC", "1"))
            .with_symbol("BSC");

        let mut at = account_task("A1");
        at.switch_symbol = Some("BSC".to_string());
        at.fees_support_account = Some(FeesSupportAccount {
            account_id: "F1".to_string(),
            ..Default::default()
        });
        let mut task = task_for("W1", at.clone());
        hydrate_and_validate(&mut task, &db, &ledger).await.unwrap();

        at.switch_symbol = Some("DOGE".to_string());
        let mut task = task_for("W1", at);
        assert!(matches!(
            hydrate_and_validate(&mut task, &db, &ledger).await,
            Err(PrecheckError::SwitchSymbolNotFound(s)) if s == "DOGE"
        ));
    }

    #[tokio::test]
    async fn token_fee_asset_needs_contract_address() {
        let (db, _dir) = temp_db();
        db.save_summary_setting(&summary_setting("W1", "A1", "5")).unwrap();
        let ledger = MockLedger::new()
            .with_account(account("A1", "W1", "ETH", "10"))
            .with_account(account("F1", "W1", "ETH", "1"));

        let mut at = account_task("A1");
        at.fees_support_account = Some(FeesSupportAccount {
            account_id: "F1".to_string(),
            is_token_contract: true,
            ..Default::default()
        });
        let mut task = task_for("W1", at);
        assert!(matches!(
            hydrate_and_validate(&mut task, &db, &ledger).await,
            Err(PrecheckError::FeesSupportContractMissing(_))
        ));
    }
}
