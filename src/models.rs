// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Domain and wire types shared by the consolidation engine, the relay and
//! the ledger client.
//!
//! Field names follow the control plane's JSON conventions (`walletID`,
//! `accountID`, camelCase elsewhere) so payloads pass through unchanged.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contract-task key matching every token an account holds.
pub const ALL_CONTRACTS: &str = "all";

// =============================================================================
// Consolidation settings and tasks
// =============================================================================

/// Durable per-account consolidation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SummarySetting {
    #[serde(rename = "walletID", default)]
    pub wallet_id: String,
    #[serde(rename = "accountID", default)]
    pub account_id: String,
    /// Collection ("sum") address every sweep pays into.
    #[serde(default)]
    pub sum_address: String,
    #[serde(default)]
    pub threshold: String,
    #[serde(default)]
    pub min_transfer: String,
    #[serde(default)]
    pub retained_balance: String,
    #[serde(default)]
    pub confirms: u64,
}

/// Account used to pay network fees for token sweeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeesSupportAccount {
    #[serde(rename = "accountID")]
    pub account_id: String,
    #[serde(default)]
    pub low_balance_warning: String,
    #[serde(default)]
    pub low_balance_stop: String,
    /// Fees are paid in a token rather than the native coin.
    #[serde(default)]
    pub is_token_contract: bool,
    #[serde(default)]
    pub contract_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContractTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_setting: Option<SummarySetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccountTask {
    #[serde(rename = "accountID")]
    pub account_id: String,
    /// Skip the native-coin sweep and only consolidate tokens.
    #[serde(default)]
    pub only_contracts: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_rate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees_support_account: Option<FeesSupportAccount>,
    /// Account-level defaults, hydrated from the persisted setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_setting: Option<SummarySetting>,
    /// Token contract address (or [`ALL_CONTRACTS`]) to contract task.
    #[serde(default)]
    pub contracts: BTreeMap<String, ContractTask>,
}

impl AccountTask {
    /// Contract task for a held token: exact key first, then the wildcard.
    pub fn contract_task_for(&self, contract_address: &str) -> Option<&ContractTask> {
        self.contracts
            .get(contract_address)
            .or_else(|| self.contracts.get(ALL_CONTRACTS))
    }
}

/// Locally known wallet, resolved lazily by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalWallet {
    #[serde(rename = "walletID")]
    pub wallet_id: String,
    pub alias: String,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WalletTask {
    #[serde(rename = "walletID")]
    pub wallet_id: String,
    /// Unlock secret. Accepted on input, never serialized back out.
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(skip)]
    pub wallet: Option<LocalWallet>,
    #[serde(default)]
    pub accounts: Vec<AccountTask>,
}

/// The whole definition of what to sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationTask {
    #[serde(default)]
    pub wallets: Vec<WalletTask>,
}

impl ConsolidationTask {
    /// Copy with every unlock secret and cached wallet handle removed.
    pub fn redacted(&self) -> Self {
        Self {
            wallets: self
                .wallets
                .iter()
                .map(|w| WalletTask {
                    wallet_id: w.wallet_id.clone(),
                    password: String::new(),
                    wallet: None,
                    accounts: w.accounts.clone(),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

/// How a started task combines with the active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum OperateType {
    Reset,
    Add,
}

impl TryFrom<i64> for OperateType {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OperateType::Reset),
            1 => Ok(OperateType::Add),
            other => Err(format!("unknown operate type: {other}")),
        }
    }
}

impl From<OperateType> for i64 {
    fn from(value: OperateType) -> Self {
        match value {
            OperateType::Reset => 0,
            OperateType::Add => 1,
        }
    }
}

// =============================================================================
// Persisted records
// =============================================================================

/// Append-only record of one swept address window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationLogEntry {
    pub sid: String,
    #[serde(rename = "walletID")]
    pub wallet_id: String,
    #[serde(rename = "accountID")]
    pub account_id: String,
    pub start_addr_index: u64,
    pub end_addr_index: u64,
    pub coin: Coin,
    pub success_count: usize,
    pub fail_count: usize,
    #[serde(rename = "txIDs")]
    pub tx_ids: Vec<String>,
    pub sids: Vec<String>,
    pub total_sum_amount: String,
    pub total_cost_fees: String,
    pub create_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustAddress {
    pub address: String,
    pub symbol: String,
    #[serde(default)]
    pub memo: String,
    pub create_time: i64,
}

impl TrustAddress {
    pub fn new(address: impl Into<String>, symbol: impl Into<String>, memo: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            symbol: symbol.into(),
            memo: memo.into(),
            create_time: Utc::now().timestamp(),
        }
    }
}

// =============================================================================
// Ledger service types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Coin {
    pub symbol: String,
    #[serde(default)]
    pub is_contract: bool,
    #[serde(rename = "contractID", default, skip_serializing_if = "String::is_empty")]
    pub contract_id: String,
}

impl Coin {
    pub fn native(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            is_contract: false,
            contract_id: String::new(),
        }
    }

    pub fn token(symbol: impl Into<String>, contract_id: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            is_contract: true,
            contract_id: contract_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    #[serde(rename = "walletID")]
    pub wallet_id: String,
    pub alias: String,
    #[serde(default)]
    pub root_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(rename = "accountID")]
    pub account_id: String,
    #[serde(rename = "walletID")]
    pub wallet_id: String,
    #[serde(default)]
    pub alias: String,
    pub symbol: String,
    #[serde(default)]
    pub balance: String,
    /// Highest allocated address index.
    #[serde(default)]
    pub address_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub address: String,
    #[serde(rename = "accountID")]
    pub account_id: String,
    #[serde(default)]
    pub address_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub decimals: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    #[serde(rename = "contractID")]
    pub contract_id: String,
    pub token: String,
    /// Token contract address, the key contract tasks match against.
    pub address: String,
    pub balance: String,
}

/// One signature slot the ledger asks the local key to fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct KeySignature {
    #[serde(default)]
    pub address: String,
    /// Hex-encoded 32-byte digest to sign.
    pub message: String,
    #[serde(default)]
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ErrorMsg {
    pub code: u64,
    pub err: String,
}

/// Unsigned (or signed) transaction as produced by the ledger service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    #[serde(default)]
    pub sid: String,
    #[serde(rename = "accountID")]
    pub account_id: String,
    pub coin: Coin,
    /// Destination address to amount.
    #[serde(default)]
    pub to: BTreeMap<String, String>,
    #[serde(default)]
    pub raw_hex: String,
    #[serde(default)]
    pub fee_rate: String,
    #[serde(default)]
    pub fees: String,
    /// Signer account to the signature slots it must fill.
    #[serde(default)]
    pub signatures: BTreeMap<String, Vec<KeySignature>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<ErrorMsg>,
}

impl RawTransaction {
    pub fn has_error(&self) -> bool {
        self.error_msg.as_ref().is_some_and(|e| e.code != 0)
    }
}

/// Transaction accepted by the ledger service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub txid: String,
    #[serde(default)]
    pub sid: String,
    #[serde(rename = "accountID", default)]
    pub account_id: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub fees: String,
    #[serde(default)]
    pub to_address: Vec<String>,
    /// Amounts paired with `to_address` by position.
    #[serde(rename = "toAddressV", default)]
    pub to_amounts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRawTransaction {
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_tx: Option<RawTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SubmitResult {
    #[serde(default)]
    pub success: Vec<Transaction>,
    #[serde(default)]
    pub failure: Vec<FailedRawTransaction>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn contract_lookup_prefers_exact_key() {
        let mut account = AccountTask {
            account_id: "A1".to_string(),
            ..Default::default()
        };
        let exact = ContractTask {
            summary_setting: Some(SummarySetting {
                threshold: "1".to_string(),
                ..Default::default()
            }),
        };
        account.contracts.insert("0xtoken".to_string(), exact.clone());
        account
            .contracts
            .insert(ALL_CONTRACTS.to_string(), ContractTask::default());

        assert_eq!(account.contract_task_for("0xtoken"), Some(&exact));
        assert_eq!(
            account.contract_task_for("0xother"),
            Some(&ContractTask::default())
        );

        account.contracts.remove(ALL_CONTRACTS);
        assert!(account.contract_task_for("0xother").is_none());
    }

    #[test]
    fn wallet_password_is_read_but_never_written() {
        let task: ConsolidationTask = serde_json::from_value(json!({
            "wallets": [{
                "walletID": "W1",
                "password": "hunter2",
                "accounts": [{ "accountID": "A1", "onlyContracts": true }]
            }]
        }))
        .unwrap();

        assert_eq!(task.wallets[0].password, "hunter2");
        assert!(task.wallets[0].accounts[0].only_contracts);

        let out = serde_json::to_value(&task).unwrap();
        assert!(out["wallets"][0].get("password").is_none());
    }

    #[test]
    fn redacted_strips_secrets_and_handles() {
        let task = ConsolidationTask {
            wallets: vec![WalletTask {
                wallet_id: "W1".to_string(),
                password: "pw".to_string(),
                wallet: Some(LocalWallet {
                    wallet_id: "W1".to_string(),
                    alias: "main".to_string(),
                    public_key: "02ab".to_string(),
                    created_at: Utc::now(),
                }),
                accounts: vec![AccountTask {
                    account_id: "A1".to_string(),
                    ..Default::default()
                }],
            }],
        };

        let redacted = task.redacted();
        assert!(redacted.wallets[0].password.is_empty());
        assert!(redacted.wallets[0].wallet.is_none());
        assert_eq!(redacted.wallets[0].accounts, task.wallets[0].accounts);
    }

    #[test]
    fn operate_type_uses_numeric_wire_form() {
        let reset: OperateType = serde_json::from_value(json!(0)).unwrap();
        let add: OperateType = serde_json::from_value(json!(1)).unwrap();
        assert_eq!(reset, OperateType::Reset);
        assert_eq!(add, OperateType::Add);
        assert!(serde_json::from_value::<OperateType>(json!(7)).is_err());
    }

    #[test]
    fn raw_transaction_error_flag() {
        let mut raw = RawTransaction::default();
        assert!(!raw.has_error());
        raw.error_msg = Some(ErrorMsg {
            code: 0,
            err: String::new(),
        });
        assert!(!raw.has_error());
        raw.error_msg = Some(ErrorMsg {
            code: 1001,
            err: "insufficient".to_string(),
        });
        assert!(raw.has_error());
    }
}
