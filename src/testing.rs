// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test doubles shared by unit tests across the crate.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::config::NodeConfig;
use crate::identity::NodeIdentity;
use crate::keystore::KeyStore;
use crate::ledger::{
    ContractCallRequest, CreateAccountRequest, CreatedAccount, LedgerApi, LedgerError,
    LedgerResult, SummaryTxRequest, TradeRequest,
};
use crate::models::{
    Account, Address, Coin, FailedRawTransaction, KeySignature, LocalWallet, RawTransaction,
    SubmitResult, SummarySetting, SymbolInfo, TokenBalance, Transaction, Wallet,
};

use crate::state::NodeState;
use crate::storage::{NodeDatabase, NodePaths};

pub const MOCK_FEE: &str = "0.01";
pub const MOCK_FEE_SUPPORT_AMOUNT: &str = "0.05";

pub fn account(id: &str, wallet_id: &str, symbol: &str, balance: &str) -> Account {
    Account {
        account_id: id.to_string(),
        wallet_id: wallet_id.to_string(),
        alias: id.to_lowercase(),
        symbol: symbol.to_string(),
        balance: balance.to_string(),
        address_index: 0,
    }
}

pub fn summary_setting(wallet_id: &str, account_id: &str, threshold: &str) -> SummarySetting {
    SummarySetting {
        wallet_id: wallet_id.to_string(),
        account_id: account_id.to_string(),
        sum_address: format!("sum-{account_id}"),
        threshold: threshold.to_string(),
        min_transfer: "0".to_string(),
        retained_balance: "0".to_string(),
        confirms: 1,
    }
}

pub fn token(contract_address: &str, balance: &str) -> TokenBalance {
    TokenBalance {
        contract_id: format!("cid-{contract_address}"),
        token: contract_address.to_uppercase(),
        address: contract_address.to_string(),
        balance: balance.to_string(),
    }
}

/// Node state over a temp directory, the given ledger and test config.
pub fn node_state(ledger: MockLedger) -> (NodeState, tempfile::TempDir) {
    node_state_with(ledger, |_| {})
}

pub fn node_state_with(
    ledger: MockLedger,
    configure: impl FnOnce(&mut NodeConfig),
) -> (NodeState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let paths = NodePaths::new(dir.path());
    let db = Arc::new(NodeDatabase::open(&paths.node_db()).unwrap());
    let identity = NodeIdentity::load_or_generate(&db).unwrap();
    let mut config = NodeConfig::for_tests(dir.path());
    configure(&mut config);
    let state = NodeState::new(config, db, Arc::new(ledger), KeyStore::new(paths), identity);
    (state, dir)
}

fn signature_slot(account_id: &str, message: String) -> BTreeMap<String, Vec<KeySignature>> {
    BTreeMap::from([(
        account_id.to_string(),
        vec![KeySignature {
            address: format!("{account_id}-addr-0"),
            message,
            signature: String::new(),
        }],
    )])
}

#[derive(Default)]
struct MockState {
    accounts: HashMap<String, Account>,
    symbols: HashSet<String>,
    tokens: HashMap<String, Vec<TokenBalance>>,
    fail_submit: bool,
    fee_support_txs: bool,
    unsignable_txs: bool,
    calls: Vec<String>,
    summary_requests: Vec<SummaryTxRequest>,
    submitted: Vec<Vec<RawTransaction>>,
    next_txid: u64,
}

/// Scripted in-memory ledger that records every call.
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account: Account) -> Self {
        let state = self.state.get_mut().unwrap();
        state.symbols.insert(account.symbol.clone());
        state.accounts.insert(account.account_id.clone(), account);
        self
    }

    pub fn with_address_index(mut self, account_id: &str, index: u64) -> Self {
        let state = self.state.get_mut().unwrap();
        if let Some(account) = state.accounts.get_mut(account_id) {
            account.address_index = index;
        }
        self
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.state.get_mut().unwrap().symbols.insert(symbol.to_string());
        self
    }

    pub fn with_token(mut self, account_id: &str, balance: TokenBalance) -> Self {
        self.state
            .get_mut()
            .unwrap()
            .tokens
            .entry(account_id.to_string())
            .or_default()
            .push(balance);
        self
    }

    /// Every batch submission is rejected by the service.
    pub fn failing_submit(mut self) -> Self {
        self.state.get_mut().unwrap().fail_submit = true;
        self
    }

    /// Sweep windows also return a transaction funding the fee-support account.
    pub fn with_fee_support_txs(mut self) -> Self {
        self.state.get_mut().unwrap().fee_support_txs = true;
        self
    }

    /// Sweep windows also return a transaction whose digest cannot be signed.
    pub fn with_unsignable_txs(mut self) -> Self {
        self.state.get_mut().unwrap().unsignable_txs = true;
        self
    }

    pub fn set_balance(&self, account_id: &str, balance: &str) {
        if let Some(account) = self.state.lock().unwrap().accounts.get_mut(account_id) {
            account.balance = balance.to_string();
        }
    }

    pub fn set_token_balance(&self, account_id: &str, contract_address: &str, balance: &str) {
        if let Some(tokens) = self.state.lock().unwrap().tokens.get_mut(account_id) {
            for token in tokens.iter_mut().filter(|t| t.address == contract_address) {
                token.balance = balance.to_string();
            }
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn summary_requests(&self) -> Vec<SummaryTxRequest> {
        self.state.lock().unwrap().summary_requests.clone()
    }

    pub fn submitted(&self) -> Vec<Vec<RawTransaction>> {
        self.state.lock().unwrap().submitted.clone()
    }

    fn record(&self, method: &str) {
        self.state.lock().unwrap().calls.push(method.to_string());
    }

    fn asset_balance(state: &MockState, account_id: &str, coin: &Coin) -> BigDecimal {
        let raw = if coin.is_contract {
            state
                .tokens
                .get(account_id)
                .and_then(|ts| ts.iter().find(|t| t.contract_id == coin.contract_id))
                .map(|t| t.balance.clone())
        } else {
            state.accounts.get(account_id).map(|a| a.balance.clone())
        };
        raw.and_then(|b| BigDecimal::from_str(&b).ok())
            .unwrap_or_default()
    }

    fn submit(&self, raw_txs: Vec<RawTransaction>) -> LedgerResult<SubmitResult> {
        let mut state = self.state.lock().unwrap();
        state.submitted.push(raw_txs.clone());
        if state.fail_submit {
            return Err(LedgerError::Rejected {
                status: 5001,
                message: "broadcast failed".to_string(),
            });
        }

        let mut result = SubmitResult::default();
        for raw in raw_txs {
            let signed = raw
                .signatures
                .values()
                .flatten()
                .all(|s| !s.signature.is_empty());
            if !signed {
                result.failure.push(FailedRawTransaction {
                    reason: "missing signature".to_string(),
                    raw_tx: Some(raw),
                });
                continue;
            }

            state.next_txid += 1;
            let amount = raw
                .to
                .values()
                .filter_map(|v| BigDecimal::from_str(v).ok())
                .fold(BigDecimal::default(), |acc, v| acc + v);
            result.success.push(Transaction {
                txid: format!("tx-{}", state.next_txid),
                sid: raw.sid.clone(),
                account_id: raw.account_id.clone(),
                amount: amount.to_plain_string(),
                fees: raw.fees.clone(),
                to_address: raw.to.keys().cloned().collect(),
                to_amounts: raw.to.values().cloned().collect(),
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl LedgerApi for MockLedger {
    async fn create_wallet(&self, wallet: &LocalWallet) -> LedgerResult<Wallet> {
        self.record("create_wallet");
        Ok(Wallet {
            wallet_id: wallet.wallet_id.clone(),
            alias: wallet.alias.clone(),
            root_path: String::new(),
        })
    }

    async fn create_account(&self, request: &CreateAccountRequest) -> LedgerResult<CreatedAccount> {
        self.record("create_account");
        let created = account(
            &format!("acct-{}", request.alias),
            &request.wallet_id,
            &request.symbol,
            "0",
        );
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(created.account_id.clone(), created.clone());
        Ok(CreatedAccount {
            address: vec![Address {
                address: format!("{}-addr-0", created.account_id),
                account_id: created.account_id.clone(),
                address_index: 0,
            }],
            account: created,
        })
    }

    async fn get_account(&self, account_id: &str) -> LedgerResult<Account> {
        self.record("get_account");
        self.state
            .lock()
            .unwrap()
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("account {account_id}")))
    }

    async fn get_symbol(&self, symbol: &str) -> LedgerResult<SymbolInfo> {
        self.record("get_symbol");
        if self.state.lock().unwrap().symbols.contains(symbol) {
            Ok(SymbolInfo {
                symbol: symbol.to_string(),
                name: symbol.to_string(),
                decimals: 18,
            })
        } else {
            Err(LedgerError::NotFound(format!("symbol {symbol}")))
        }
    }

    async fn get_token_balances(&self, account_id: &str) -> LedgerResult<Vec<TokenBalance>> {
        self.record("get_token_balances");
        Ok(self
            .state
            .lock()
            .unwrap()
            .tokens
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_token_balance(
        &self,
        account_id: &str,
        contract_address: &str,
    ) -> LedgerResult<TokenBalance> {
        self.record("get_token_balance");
        self.state
            .lock()
            .unwrap()
            .tokens
            .get(account_id)
            .and_then(|ts| ts.iter().find(|t| t.address == contract_address).cloned())
            .ok_or_else(|| LedgerError::NotFound(format!("token {contract_address}")))
    }

    async fn create_summary_tx(
        &self,
        request: &SummaryTxRequest,
    ) -> LedgerResult<Vec<RawTransaction>> {
        self.record("create_summary_tx");
        let mut state = self.state.lock().unwrap();
        state.summary_requests.push(request.clone());

        let mut txs = Vec::new();
        if request.address_start_index == 0 {
            let balance = Self::asset_balance(&state, &request.account_id, &request.coin);
            let retained = BigDecimal::from_str(&request.retained_balance).unwrap_or_default();
            let fee = BigDecimal::from_str(MOCK_FEE).unwrap();
            let sweep = balance - retained - fee;
            if sweep > BigDecimal::default() {
                txs.push(RawTransaction {
                    sid: request.sid.clone(),
                    account_id: request.account_id.clone(),
                    coin: request.coin.clone(),
                    to: BTreeMap::from([(request.sum_address.clone(), sweep.to_plain_string())]),
                    raw_hex: "00".to_string(),
                    fee_rate: request.fee_rate.clone(),
                    fees: MOCK_FEE.to_string(),
                    signatures: signature_slot(&request.account_id, hex::encode([9u8; 32])),
                    error_msg: None,
                });
            }
        }

        if state.unsignable_txs {
            txs.push(RawTransaction {
                sid: request.sid.clone(),
                account_id: request.account_id.clone(),
                coin: request.coin.clone(),
                to: BTreeMap::from([(request.sum_address.clone(), "1".to_string())]),
                fees: MOCK_FEE.to_string(),
                signatures: signature_slot(&request.account_id, "not-a-digest".to_string()),
                ..Default::default()
            });
        }

        if let Some(fees) = request.fees_support_account.as_ref() {
            if state.fee_support_txs {
                txs.push(RawTransaction {
                    sid: request.sid.clone(),
                    account_id: fees.account_id.clone(),
                    coin: Coin::native(request.coin.symbol.clone()),
                    to: BTreeMap::from([(
                        format!("{}-addr-1", request.account_id),
                        MOCK_FEE_SUPPORT_AMOUNT.to_string(),
                    )]),
                    fees: MOCK_FEE.to_string(),
                    signatures: signature_slot(&fees.account_id, hex::encode([3u8; 32])),
                    ..Default::default()
                });
            }
        }

        Ok(txs)
    }

    async fn submit_trade(&self, raw_txs: Vec<RawTransaction>) -> LedgerResult<SubmitResult> {
        self.record("submit_trade");
        self.submit(raw_txs)
    }

    async fn create_trade(&self, request: &TradeRequest) -> LedgerResult<RawTransaction> {
        self.record("create_trade");
        Ok(RawTransaction {
            sid: request.sid.clone(),
            account_id: request.account_id.clone(),
            coin: request.coin.clone(),
            to: request.to.clone(),
            fee_rate: request.fee_rate.clone(),
            fees: MOCK_FEE.to_string(),
            signatures: signature_slot(&request.account_id, hex::encode([5u8; 32])),
            ..Default::default()
        })
    }

    async fn create_smart_contract_trade(
        &self,
        request: &ContractCallRequest,
    ) -> LedgerResult<RawTransaction> {
        self.record("create_smart_contract_trade");
        let amount = if request.amount.is_empty() {
            "0".to_string()
        } else {
            request.amount.clone()
        };
        Ok(RawTransaction {
            sid: request.sid.clone(),
            account_id: request.account_id.clone(),
            coin: request.coin.clone(),
            to: BTreeMap::from([(request.contract_address.clone(), amount)]),
            fee_rate: request.fee_rate.clone(),
            fees: MOCK_FEE.to_string(),
            signatures: signature_slot(&request.account_id, hex::encode([6u8; 32])),
            ..Default::default()
        })
    }

    async fn submit_smart_contract_trade(
        &self,
        raw_txs: Vec<RawTransaction>,
    ) -> LedgerResult<SubmitResult> {
        self.record("submit_smart_contract_trade");
        self.submit(raw_txs)
    }
}
