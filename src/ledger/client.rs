// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP client for the remote ledger service.
//!
//! Every method is a `POST {LEDGER_URL}/api/v1/{method}` with body
//! `{appID, appKey, params}`; the service answers `{status, msg, result}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use super::{
    ContractCallRequest, CreateAccountRequest, CreatedAccount, LedgerApi, LedgerError,
    LedgerResult, SummaryTxRequest, TradeRequest, STATUS_SUCCESS,
};
use crate::models::{
    Account, LocalWallet, RawTransaction, SubmitResult, SymbolInfo, TokenBalance, Wallet,
};

/// Ledger status for an unknown account.
const STATUS_ACCOUNT_NOT_FOUND: u64 = 2003;

#[derive(Debug, Deserialize)]
struct Envelope {
    status: u64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Serialize)]
struct RequestBody<'a, P: Serialize> {
    #[serde(rename = "appID")]
    app_id: &'a str,
    #[serde(rename = "appKey")]
    app_key: &'a str,
    params: P,
}

#[derive(Clone)]
pub struct HttpLedgerClient {
    http: Client,
    base_url: String,
    app_id: String,
    app_key: String,
}

impl HttpLedgerClient {
    pub fn new(
        base_url: &str,
        app_id: &str,
        app_key: &str,
        timeout: Duration,
    ) -> LedgerResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            app_key: app_key.to_string(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, method)
    }

    async fn call<P, R>(&self, method: &str, params: P) -> LedgerResult<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let body = RequestBody {
            app_id: &self.app_id,
            app_key: &self.app_key,
            params,
        };

        let response = self
            .http
            .post(self.endpoint(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("{method}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LedgerError::Transport(format!(
                "{method} returned {status}: {text}"
            )));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("{method}: {e}")))?;

        decode_envelope(method, envelope)
    }
}

fn decode_envelope<R: DeserializeOwned>(method: &str, envelope: Envelope) -> LedgerResult<R> {
    match envelope.status {
        STATUS_SUCCESS => serde_json::from_value(envelope.result)
            .map_err(|e| LedgerError::Decode(format!("{method}: {e}"))),
        STATUS_ACCOUNT_NOT_FOUND => Err(LedgerError::NotFound(if envelope.msg.is_empty() {
            "account".to_string()
        } else {
            envelope.msg
        })),
        status => Err(LedgerError::Rejected {
            status,
            message: envelope.msg,
        }),
    }
}

#[async_trait]
impl LedgerApi for HttpLedgerClient {
    async fn create_wallet(&self, wallet: &LocalWallet) -> LedgerResult<Wallet> {
        self.call(
            "createWallet",
            json!({
                "walletID": wallet.wallet_id,
                "alias": wallet.alias,
                "publicKey": wallet.public_key,
            }),
        )
        .await
    }

    async fn create_account(&self, request: &CreateAccountRequest) -> LedgerResult<CreatedAccount> {
        self.call("createAccount", request).await
    }

    async fn get_account(&self, account_id: &str) -> LedgerResult<Account> {
        let accounts: Vec<Account> = self
            .call("findAccountByAccountID", json!({ "accountID": account_id }))
            .await?;
        accounts
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::NotFound(format!("account {account_id}")))
    }

    async fn get_symbol(&self, symbol: &str) -> LedgerResult<SymbolInfo> {
        let symbols: Vec<SymbolInfo> = self
            .call("getSymbolList", json!({ "symbol": symbol }))
            .await?;
        symbols
            .into_iter()
            .find(|s| s.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| LedgerError::NotFound(format!("symbol {symbol}")))
    }

    async fn get_token_balances(&self, account_id: &str) -> LedgerResult<Vec<TokenBalance>> {
        self.call(
            "getAllTokenBalanceByAccount",
            json!({ "accountID": account_id }),
        )
        .await
    }

    async fn get_token_balance(
        &self,
        account_id: &str,
        contract_address: &str,
    ) -> LedgerResult<TokenBalance> {
        self.call(
            "getTokenBalanceByAccount",
            json!({ "accountID": account_id, "contractAddress": contract_address }),
        )
        .await
    }

    async fn create_summary_tx(
        &self,
        request: &SummaryTxRequest,
    ) -> LedgerResult<Vec<RawTransaction>> {
        self.call("createSummaryTx", request).await
    }

    async fn submit_trade(&self, raw_txs: Vec<RawTransaction>) -> LedgerResult<SubmitResult> {
        self.call("submitTrade", json!({ "rawTx": raw_txs })).await
    }

    async fn create_trade(&self, request: &TradeRequest) -> LedgerResult<RawTransaction> {
        self.call("createTrade", request).await
    }

    async fn create_smart_contract_trade(
        &self,
        request: &ContractCallRequest,
    ) -> LedgerResult<RawTransaction> {
        self.call("createSmartContractTrade", request).await
    }

    async fn submit_smart_contract_trade(
        &self,
        raw_txs: Vec<RawTransaction>,
    ) -> LedgerResult<SubmitResult> {
        self.call("submitSmartContractTrade", json!({ "rawTx": raw_txs }))
            .await
    }
}
