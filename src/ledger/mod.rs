// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Remote wallet-ledger service.
//!
//! The ledger owns wallet, account and address records, tracks balances and
//! builds unsigned transactions. This node only signs what the ledger builds
//! and submits the result back. Everything the core needs from the service
//! goes through [`LedgerApi`] so tests can script it.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{
    Account, Address, Coin, FeesSupportAccount, LocalWallet, RawTransaction, SubmitResult,
    SymbolInfo, TokenBalance, Wallet,
};

pub use client::HttpLedgerClient;

/// Ledger status code for a successful call.
pub const STATUS_SUCCESS: u64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger request failed: {0}")]
    Transport(String),

    #[error("ledger rejected request (status {status}): {message}")]
    Rejected { status: u64, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid ledger response: {0}")]
    Decode(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub alias: String,
    #[serde(rename = "walletID")]
    pub wallet_id: String,
    pub symbol: String,
    /// Wallet public key the ledger derives account addresses under.
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAccount {
    pub account: Account,
    #[serde(default)]
    pub address: Vec<Address>,
}

/// One window of a consolidation sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTxRequest {
    #[serde(rename = "accountID")]
    pub account_id: String,
    pub sum_address: String,
    pub coin: Coin,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fee_rate: String,
    pub min_transfer: String,
    pub retained_balance: String,
    pub address_start_index: u64,
    pub address_limit: u64,
    pub confirms: u64,
    pub sid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees_support_account: Option<FeesSupportAccount>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    #[serde(rename = "accountID")]
    pub account_id: String,
    pub sid: String,
    pub coin: Coin,
    /// Token contract address; empty for a native transfer.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contract_address: String,
    pub to: std::collections::BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fee_rate: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memo: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ext_param: String,
}

/// Smart-contract call built from ABI arguments or a caller-supplied raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCallRequest {
    #[serde(rename = "accountID")]
    pub account_id: String,
    pub sid: String,
    pub coin: Coin,
    pub contract_address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contract_abi: String,
    #[serde(default)]
    pub abi_param: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raw: String,
    /// 0 hex, 1 JSON, 2 base64.
    #[serde(default)]
    pub raw_type: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fee_rate: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub amount: String,
    #[serde(default)]
    pub await_result: bool,
}

// =============================================================================
// Trait
// =============================================================================

#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Register a locally generated wallet key with the ledger.
    async fn create_wallet(&self, wallet: &LocalWallet) -> LedgerResult<Wallet>;

    async fn create_account(&self, request: &CreateAccountRequest) -> LedgerResult<CreatedAccount>;

    async fn get_account(&self, account_id: &str) -> LedgerResult<Account>;

    async fn get_symbol(&self, symbol: &str) -> LedgerResult<SymbolInfo>;

    /// Every token balance the account holds.
    async fn get_token_balances(&self, account_id: &str) -> LedgerResult<Vec<TokenBalance>>;

    async fn get_token_balance(
        &self,
        account_id: &str,
        contract_address: &str,
    ) -> LedgerResult<TokenBalance>;

    /// Build unsigned sweep transactions for one address window.
    async fn create_summary_tx(&self, request: &SummaryTxRequest)
        -> LedgerResult<Vec<RawTransaction>>;

    async fn submit_trade(&self, raw_txs: Vec<RawTransaction>) -> LedgerResult<SubmitResult>;

    async fn create_trade(&self, request: &TradeRequest) -> LedgerResult<RawTransaction>;

    async fn create_smart_contract_trade(
        &self,
        request: &ContractCallRequest,
    ) -> LedgerResult<RawTransaction>;

    async fn submit_smart_contract_trade(
        &self,
        raw_txs: Vec<RawTransaction>,
    ) -> LedgerResult<SubmitResult>;
}
