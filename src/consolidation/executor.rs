// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Consolidation Executor
//!
//! One tick sweeps every asset of every account in the active task into the
//! account's collection address.
//!
//! ## Per-asset flow
//!
//! 1. Skip the asset when its balance is not above the threshold.
//! 2. For token sweeps with a fee-support account, check the fee account's
//!    balance: below the warning level logs, below the stop level aborts
//!    this asset.
//! 3. Walk the account's address indices in windows of [`WINDOW_SIZE`]. For
//!    each window the ledger builds unsigned transactions, which are split
//!    into sweep and fee-support batches, signed with the wallet key and
//!    submitted. A successful sweep batch is recorded in the consolidation
//!    log.
//!
//! Wallets, accounts and windows are processed strictly in order. Failures
//! are logged and contained to the wallet, asset or window they hit; the
//! next tick retries implicitly.

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::task_store::TaskStore;
use crate::keystore::{KeyStore, KeyStoreError, UnlockedKey};
use crate::ledger::{LedgerApi, LedgerError, SummaryTxRequest};
use crate::models::{
    Account, AccountTask, Coin, ConsolidationLogEntry, LocalWallet, RawTransaction,
    SummarySetting, WalletTask,
};
use crate::storage::{NodeDatabase, StoreError};

/// Address indices covered by one sweep request.
pub const WINDOW_SIZE: u64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    #[error("account {0} has no usable summary setting")]
    MissingSetting(String),

    #[error("invalid {field}: {value:?}")]
    InvalidAmount { field: &'static str, value: String },

    #[error("fees support account {account_id} balance {balance} is below stop level {stop}")]
    FeesSupportBelowStop {
        account_id: String,
        balance: BigDecimal,
        stop: BigDecimal,
    },

    #[error("fees support account {0} pays fees in a token but has no contract address")]
    FeesSupportContractMissing(String),
}

/// Counters for one tick, mostly useful to tests and the tick summary log.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub wallets_skipped: usize,
    pub accounts_skipped: usize,
    pub assets_below_threshold: usize,
    pub assets_swept: usize,
    pub assets_failed: usize,
    pub windows: usize,
    pub log_entries: usize,
}

enum AssetOutcome {
    BelowThreshold,
    Swept { windows: usize, log_entries: usize },
}

pub struct Executor {
    db: Arc<NodeDatabase>,
    ledger: Arc<dyn LedgerApi>,
    keystore: KeyStore,
    tasks: Arc<TaskStore>,
    /// Serializes ticks started by the scheduler and by relay calls.
    tick_lock: Mutex<()>,
}

impl Executor {
    pub fn new(
        db: Arc<NodeDatabase>,
        ledger: Arc<dyn LedgerApi>,
        keystore: KeyStore,
        tasks: Arc<TaskStore>,
    ) -> Self {
        Self {
            db,
            ledger,
            keystore,
            tasks,
            tick_lock: Mutex::new(()),
        }
    }

    /// Run one consolidation pass over a snapshot of the active task.
    pub async fn run_tick(&self) -> TickReport {
        let _guard = self.tick_lock.lock().await;
        let task = self.tasks.snapshot();
        let mut report = TickReport::default();

        info!(wallets = task.wallets.len(), "Consolidation tick started");

        for wallet_task in &task.wallets {
            let Some(wallet) = self.resolve_wallet(wallet_task) else {
                report.wallets_skipped += 1;
                continue;
            };

            if wallet_task.password.is_empty() {
                error!(wallet_id = %wallet.wallet_id, "No unlock secret for consolidation wallet");
                report.wallets_skipped += 1;
                continue;
            }

            let key = match self.keystore.unlock(&wallet.wallet_id, &wallet_task.password) {
                Ok(key) => key,
                Err(e) => {
                    error!(wallet_id = %wallet.wallet_id, error = %e, "Failed to unlock consolidation wallet");
                    report.wallets_skipped += 1;
                    continue;
                }
            };

            for account_task in &wallet_task.accounts {
                self.sweep_account(account_task, &key, &mut report).await;
            }
        }

        info!(
            wallets_skipped = report.wallets_skipped,
            assets_swept = report.assets_swept,
            assets_failed = report.assets_failed,
            log_entries = report.log_entries,
            "Consolidation tick finished"
        );
        report
    }

    fn resolve_wallet(&self, wallet_task: &WalletTask) -> Option<LocalWallet> {
        if let Some(wallet) = &wallet_task.wallet {
            return Some(wallet.clone());
        }
        match self.keystore.wallet(&wallet_task.wallet_id) {
            Ok(wallet) => {
                self.tasks.cache_wallet(wallet.clone());
                Some(wallet)
            }
            Err(e) => {
                error!(wallet_id = %wallet_task.wallet_id, error = %e, "Consolidation wallet lookup failed");
                None
            }
        }
    }

    async fn sweep_account(
        &self,
        account_task: &AccountTask,
        key: &UnlockedKey,
        report: &mut TickReport,
    ) {
        let account_id = account_task.account_id.as_str();

        let account = match self.ledger.get_account(account_id).await {
            Ok(account) => account,
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "Consolidation account lookup failed");
                report.accounts_skipped += 1;
                return;
            }
        };

        let base = match self.account_setting(account_task) {
            Ok(setting) => setting,
            Err(e) => {
                error!(account_id = %account_id, error = %e, "Refusing to sweep account");
                report.accounts_skipped += 1;
                return;
            }
        };

        let symbol = account_task
            .switch_symbol
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| account.symbol.clone());

        if !account_task.only_contracts {
            let coin = Coin::native(symbol.clone());
            let outcome = self
                .sweep_asset(&account, account_task, key, &account.balance, &base, coin)
                .await;
            record_outcome(report, account_id, &symbol, outcome);
        }

        if account_task.contracts.is_empty() {
            return;
        }

        let tokens = match self.ledger.get_token_balances(account_id).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "Token balance lookup failed");
                return;
            }
        };

        for token in tokens {
            let Some(contract_task) = account_task.contract_task_for(&token.address) else {
                continue;
            };

            let mut setting = contract_task
                .summary_setting
                .clone()
                .unwrap_or_else(|| base.clone());
            setting.sum_address = base.sum_address.clone();

            let coin = Coin::token(symbol.clone(), token.contract_id.clone());
            let outcome = self
                .sweep_asset(&account, account_task, key, &token.balance, &setting, coin)
                .await;
            record_outcome(report, account_id, &token.token, outcome);
        }
    }

    /// The account default setting, always anchored to the persisted record.
    fn account_setting(&self, account_task: &AccountTask) -> Result<SummarySetting, SweepError> {
        let persisted = self
            .db
            .get_summary_setting(&account_task.account_id)?
            .filter(|s| !s.sum_address.is_empty())
            .ok_or_else(|| SweepError::MissingSetting(account_task.account_id.clone()))?;

        let mut setting = account_task
            .summary_setting
            .clone()
            .unwrap_or_else(|| persisted.clone());
        setting.sum_address = persisted.sum_address;
        Ok(setting)
    }

    async fn sweep_asset(
        &self,
        account: &Account,
        account_task: &AccountTask,
        key: &UnlockedKey,
        balance: &str,
        setting: &SummarySetting,
        coin: Coin,
    ) -> Result<AssetOutcome, SweepError> {
        let balance_dec = parse_decimal("balance", balance)?;
        let threshold = parse_decimal("threshold", &setting.threshold)?;

        if balance_dec <= threshold {
            info!(
                account_id = %account.account_id,
                symbol = %coin.symbol,
                contract_id = %coin.contract_id,
                balance = %balance_dec,
                threshold = %threshold,
                "Balance not above threshold, skipping"
            );
            return Ok(AssetOutcome::BelowThreshold);
        }

        let fees_account_id = if coin.is_contract {
            self.check_fees_support(account_task).await?
        } else {
            None
        };

        info!(
            account_id = %account.account_id,
            symbol = %coin.symbol,
            contract_id = %coin.contract_id,
            balance = %balance_dec,
            sum_address = %setting.sum_address,
            "Sweeping asset"
        );

        let mut windows = 0;
        let mut log_entries = 0;
        let mut start = 0u64;
        while start <= account.address_index {
            windows += 1;
            match self
                .sweep_window(
                    account,
                    account_task,
                    key,
                    setting,
                    &coin,
                    fees_account_id.as_deref(),
                    start,
                )
                .await
            {
                Ok(Some(_)) => log_entries += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        account_id = %account.account_id,
                        start,
                        end = start + WINDOW_SIZE,
                        error = %e,
                        "Consolidation window failed"
                    );
                }
            }
            start += WINDOW_SIZE;
        }

        Ok(AssetOutcome::Swept {
            windows,
            log_entries,
        })
    }

    /// Check the fee-support account for a token sweep. Returns its id when
    /// one is configured and funded above the stop level.
    async fn check_fees_support(
        &self,
        account_task: &AccountTask,
    ) -> Result<Option<String>, SweepError> {
        let Some(fees) = account_task
            .fees_support_account
            .as_ref()
            .filter(|f| !f.account_id.is_empty())
        else {
            return Ok(None);
        };

        let raw_balance = if fees.is_token_contract {
            if fees.contract_address.is_empty() {
                return Err(SweepError::FeesSupportContractMissing(
                    fees.account_id.clone(),
                ));
            }
            self.ledger
                .get_token_balance(&fees.account_id, &fees.contract_address)
                .await?
                .balance
        } else {
            self.ledger.get_account(&fees.account_id).await?.balance
        };
        let balance = parse_decimal("fees support balance", &raw_balance)?;

        if !fees.low_balance_warning.is_empty() {
            let warning = parse_decimal("low balance warning", &fees.low_balance_warning)?;
            if balance < warning {
                warn!(
                    account_id = %fees.account_id,
                    balance = %balance,
                    warning = %warning,
                    "Fees support account balance is low"
                );
            }
        }

        if !fees.low_balance_stop.is_empty() {
            let stop = parse_decimal("low balance stop", &fees.low_balance_stop)?;
            if balance < stop {
                return Err(SweepError::FeesSupportBelowStop {
                    account_id: fees.account_id.clone(),
                    balance,
                    stop,
                });
            }
        }

        Ok(Some(fees.account_id.clone()))
    }

    #[allow(clippy::too_many_arguments)]
    async fn sweep_window(
        &self,
        account: &Account,
        account_task: &AccountTask,
        key: &UnlockedKey,
        setting: &SummarySetting,
        coin: &Coin,
        fees_account_id: Option<&str>,
        start: u64,
    ) -> Result<Option<ConsolidationLogEntry>, SweepError> {
        let sid = Uuid::new_v4().to_string();
        info!(
            account_id = %account.account_id,
            start,
            end = start + WINDOW_SIZE,
            sid = %sid,
            "Creating consolidation transactions for address window"
        );

        let request = SummaryTxRequest {
            account_id: account.account_id.clone(),
            sum_address: setting.sum_address.clone(),
            coin: coin.clone(),
            fee_rate: account_task.fee_rate.clone().unwrap_or_default(),
            min_transfer: setting.min_transfer.clone(),
            retained_balance: setting.retained_balance.clone(),
            address_start_index: start,
            address_limit: WINDOW_SIZE,
            confirms: setting.confirms,
            sid: sid.clone(),
            fees_support_account: account_task.fees_support_account.clone(),
            memo: account_task.memo.clone().unwrap_or_default(),
        };
        let raw_txs = self.ledger.create_summary_tx(&request).await?;

        let mut sweep_txs = Vec::new();
        let mut fee_txs = Vec::new();
        for raw in raw_txs {
            if raw.has_error() {
                let reason = raw.error_msg.as_ref().map(|e| e.err.as_str()).unwrap_or("");
                warn!(account_id = %raw.account_id, reason = %reason, "Ledger could not build transaction");
                continue;
            }
            if raw.account_id == account.account_id {
                sweep_txs.push(raw);
            } else if Some(raw.account_id.as_str()) == fees_account_id {
                fee_txs.push(raw);
            } else {
                warn!(account_id = %raw.account_id, "Ignoring transaction for unrelated account");
            }
        }

        let mut entry = None;
        if !sweep_txs.is_empty() {
            let signed = sign_batch(key, sweep_txs);
            if signed.is_empty() {
                warn!(account_id = %account.account_id, start, "No transaction in window could be signed");
                return Ok(None);
            }

            let result = self.ledger.submit_trade(signed).await?;

            let mut total_sum = BigDecimal::default();
            let mut total_fees = BigDecimal::default();
            let mut tx_ids = Vec::with_capacity(result.success.len());
            let mut sids = Vec::with_capacity(result.success.len());
            for tx in &result.success {
                info!(txid = %tx.txid, "Consolidation transaction submitted");
                total_fees += lenient_decimal(&tx.fees);
                tx_ids.push(tx.txid.clone());
                sids.push(tx.sid.clone());
                for (to, amount) in tx.to_address.iter().zip(&tx.to_amounts) {
                    if *to == setting.sum_address {
                        total_sum += lenient_decimal(amount);
                    }
                }
            }
            for failed in &result.failure {
                warn!(reason = %failed.reason, "Consolidation transaction failed");
            }

            let log_entry = ConsolidationLogEntry {
                sid: sid.clone(),
                wallet_id: account.wallet_id.clone(),
                account_id: account.account_id.clone(),
                start_addr_index: start,
                end_addr_index: start + WINDOW_SIZE,
                coin: coin.clone(),
                success_count: result.success.len(),
                fail_count: result.failure.len(),
                tx_ids,
                sids,
                total_sum_amount: (total_sum - &total_fees).to_plain_string(),
                total_cost_fees: total_fees.to_plain_string(),
                create_time: Utc::now().timestamp(),
            };
            if let Err(e) = self.db.append_consolidation_log(&log_entry) {
                warn!(sid = %sid, error = %e, "Failed to save consolidation log");
            }
            entry = Some(log_entry);
        }

        if !fee_txs.is_empty() {
            self.submit_fee_support(key, fee_txs, coin).await?;
        }

        Ok(entry)
    }

    async fn submit_fee_support(
        &self,
        key: &UnlockedKey,
        fee_txs: Vec<RawTransaction>,
        coin: &Coin,
    ) -> Result<(), SweepError> {
        info!(count = fee_txs.len(), "Funding fees for consolidation");
        let signed = sign_batch(key, fee_txs);
        if signed.is_empty() {
            return Ok(());
        }

        let result = self.ledger.submit_trade(signed).await?;
        let mut total_cost = BigDecimal::default();
        for tx in &result.success {
            total_cost += lenient_decimal(&tx.amount);
            info!(txid = %tx.txid, "Fees support transaction submitted");
        }
        for failed in &result.failure {
            warn!(reason = %failed.reason, "Fees support transaction failed");
        }
        info!(total_cost = %total_cost, symbol = %coin.symbol, "Fees support account total cost");
        Ok(())
    }
}

fn record_outcome(
    report: &mut TickReport,
    account_id: &str,
    asset: &str,
    outcome: Result<AssetOutcome, SweepError>,
) {
    match outcome {
        Ok(AssetOutcome::BelowThreshold) => report.assets_below_threshold += 1,
        Ok(AssetOutcome::Swept {
            windows,
            log_entries,
        }) => {
            report.assets_swept += 1;
            report.windows += windows;
            report.log_entries += log_entries;
        }
        Err(e) => {
            report.assets_failed += 1;
            error!(account_id = %account_id, asset = %asset, error = %e, "Asset consolidation aborted");
        }
    }
}

/// Sign each transaction; ones that fail are dropped from the batch.
fn sign_batch(key: &UnlockedKey, txs: Vec<RawTransaction>) -> Vec<RawTransaction> {
    let mut signed = Vec::with_capacity(txs.len());
    for mut raw in txs {
        match key.sign_raw_transaction(&mut raw) {
            Ok(()) => signed.push(raw),
            Err(e) => warn!(sid = %raw.sid, error = %e, "Dropping transaction that failed to sign"),
        }
    }
    signed
}

/// Amounts are arbitrary-precision decimal strings; nothing is rounded.
fn parse_decimal(field: &'static str, value: &str) -> Result<BigDecimal, SweepError> {
    BigDecimal::from_str(value.trim()).map_err(|_| SweepError::InvalidAmount {
        field,
        value: value.to_string(),
    })
}

/// Amounts reported back by the ledger only feed the log totals.
fn lenient_decimal(value: &str) -> BigDecimal {
    BigDecimal::from_str(value.trim()).unwrap_or_else(|_| {
        warn!(value = %value, "Unparseable amount in ledger response");
        BigDecimal::default()
    })
}
