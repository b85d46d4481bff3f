// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay method handlers.
//!
//! Handlers run after the dispatcher's appID and capability gates. Each one
//! decodes its own params and returns the JSON payload for the reply.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::dispatcher::RelayMethod;
use crate::error::{RelayError, RelayResult};
use crate::keystore::UnlockedKey;
use crate::ledger::{ContractCallRequest, CreateAccountRequest, LedgerError, TradeRequest};
use crate::models::{
    Account, Coin, ConsolidationTask, OperateType, RawTransaction, SubmitResult, SummarySetting,
};
use crate::state::NodeState;

/// Connect type reported to the control plane.
pub const CONNECT_TYPE: &str = "websocket";

pub async fn handle(state: &NodeState, method: RelayMethod, params: Value) -> RelayResult<Value> {
    match method {
        RelayMethod::GetTrustNodeInfo => trust_node_info(state),
        RelayMethod::CreateWallet => create_wallet(state, decode(params)?).await,
        RelayMethod::CreateAccount => create_account(state, decode(params)?).await,
        RelayMethod::SendTransaction => send_transaction(state, decode(params)?).await,
        RelayMethod::SetSummaryInfo => set_summary_info(state, decode(params)?),
        RelayMethod::FindSummaryInfoByWalletId => find_summary_info(state, decode(params)?),
        RelayMethod::StartSummaryTask => start_summary_task(state, decode(params)?).await,
        RelayMethod::StopSummaryTask => stop_summary_task(state),
        RelayMethod::AppendSummaryTask => append_summary_task(state, decode(params)?).await,
        RelayMethod::RemoveSummaryTask => remove_summary_task(state, decode(params)?),
        RelayMethod::GetCurrentSummaryTask => current_summary_task(state),
        RelayMethod::GetSummaryTaskLog => summary_task_log(state, decode(params)?),
        RelayMethod::GetLocalWalletList => local_wallet_list(state),
        RelayMethod::GetTrustAddressList => trust_address_list(state, decode(params)?),
        RelayMethod::SignTransaction => sign_transaction(state, decode(params)?),
        RelayMethod::TriggerAbi => trigger_abi(state, decode(params)?).await,
        RelayMethod::SignHash => sign_hash(state, decode(params)?),
    }
}

fn decode<T: DeserializeOwned>(params: Value) -> RelayResult<T> {
    serde_json::from_value(params).map_err(|e| RelayError::unknown(format!("invalid params: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> RelayResult<Value> {
    serde_json::to_value(value).map_err(|e| RelayError::unknown(e.to_string()))
}

/// Unlock a wallet key with the given secret, falling back to the cached one.
fn unlock(state: &NodeState, wallet_id: &str, given: &str) -> RelayResult<UnlockedKey> {
    let secret = state.resolve_secret(wallet_id, given);
    if secret.is_empty() {
        return Err(RelayError::unknown("unlock wallet password is empty"));
    }
    Ok(state.keystore.unlock(wallet_id, &secret)?)
}

fn require_timer(state: &NodeState) -> RelayResult<()> {
    if state.scheduler.is_running() {
        Ok(())
    } else {
        Err(RelayError::timer_not_started())
    }
}

fn check_trusted(state: &NodeState, address: &str, symbol: &str) -> RelayResult<()> {
    if state.trust.is_allowed(address, symbol) {
        Ok(())
    } else {
        Err(RelayError::not_trusted(address))
    }
}

/// Fail the call when the ledger accepted nothing.
fn submitted(result: SubmitResult) -> RelayResult<SubmitResult> {
    if result.success.is_empty() {
        if let Some(failed) = result.failure.first() {
            return Err(RelayError::unknown(failed.reason.clone()));
        }
    }
    for tx in &result.success {
        info!(txid = %tx.txid, "Transaction submitted");
    }
    Ok(result)
}

/// Coin for a transfer from `account`, resolving a token by contract address.
async fn transfer_coin(
    state: &NodeState,
    account: &Account,
    contract_address: &str,
) -> RelayResult<Coin> {
    if contract_address.is_empty() {
        return Ok(Coin::native(account.symbol.clone()));
    }
    match state
        .ledger
        .get_token_balance(&account.account_id, contract_address)
        .await
    {
        Ok(token) => Ok(Coin::token(account.symbol.clone(), token.contract_id)),
        Err(LedgerError::NotFound(_)) => Err(RelayError::unknown(format!(
            "can not find contract address {contract_address}"
        ))),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// Node and wallet management
// =============================================================================

fn trust_node_info(state: &NodeState) -> RelayResult<Value> {
    Ok(json!({
        "nodeID": state.identity.node_id(),
        "nodeName": state.config.local_name,
        "connectType": CONNECT_TYPE,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
struct CreateWalletParams {
    alias: String,
    password: String,
}

async fn create_wallet(state: &NodeState, params: CreateWalletParams) -> RelayResult<Value> {
    let local = state.keystore.create_wallet(&params.alias, &params.password)?;
    let wallet = state.ledger.create_wallet(&local).await?;
    to_json(&wallet)
}

#[derive(Deserialize)]
struct CreateAccountParams {
    alias: String,
    #[serde(rename = "walletID")]
    wallet_id: String,
    symbol: String,
    #[serde(default)]
    password: String,
}

async fn create_account(state: &NodeState, params: CreateAccountParams) -> RelayResult<Value> {
    let key = unlock(state, &params.wallet_id, &params.password)?;
    let created = state
        .ledger
        .create_account(&CreateAccountRequest {
            alias: params.alias,
            wallet_id: params.wallet_id,
            symbol: params.symbol,
            public_key: key.public_key(),
        })
        .await?;
    to_json(&created)
}

fn local_wallet_list(state: &NodeState) -> RelayResult<Value> {
    to_json(&state.keystore.list_wallets()?)
}

#[derive(Deserialize, Default)]
struct TrustAddressListParams {
    #[serde(default)]
    symbol: String,
}

fn trust_address_list(state: &NodeState, params: TrustAddressListParams) -> RelayResult<Value> {
    let list = state.trust.list(Some(params.symbol.as_str()))?;
    let enabled = state.trust.is_enabled()?;
    Ok(json!({
        "trustAddressList": list,
        "enableTrustAddress": enabled,
    }))
}

// =============================================================================
// Transfers and signing
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendTransactionParams {
    #[serde(rename = "accountID")]
    account_id: String,
    sid: String,
    #[serde(default)]
    contract_address: String,
    #[serde(default)]
    password: String,
    amount: String,
    address: String,
    #[serde(default)]
    fee_rate: String,
    #[serde(default)]
    memo: String,
    #[serde(default)]
    ext_param: String,
}

async fn send_transaction(state: &NodeState, params: SendTransactionParams) -> RelayResult<Value> {
    let account = state.ledger.get_account(&params.account_id).await?;
    check_trusted(state, &params.address, &account.symbol)?;

    let key = unlock(state, &account.wallet_id, &params.password)?;
    let coin = transfer_coin(state, &account, &params.contract_address).await?;

    let mut raw_tx = state
        .ledger
        .create_trade(&TradeRequest {
            account_id: account.account_id.clone(),
            sid: params.sid,
            coin,
            contract_address: params.contract_address,
            to: [(params.address.clone(), params.amount.clone())].into(),
            fee_rate: params.fee_rate,
            memo: params.memo,
            ext_param: params.ext_param,
        })
        .await?;

    info!(
        sid = %raw_tx.sid,
        account_id = %account.account_id,
        to = %params.address,
        amount = %params.amount,
        fees = %raw_tx.fees,
        "Relayed transfer"
    );

    key.sign_raw_transaction(&mut raw_tx)
        .map_err(|e| RelayError::sign_failed(e.to_string()))?;
    let result = submitted(state.ledger.submit_trade(vec![raw_tx]).await?)?;
    to_json(&result)
}

#[derive(Deserialize)]
struct SignTransactionParams {
    #[serde(rename = "walletID")]
    wallet_id: String,
    #[serde(default)]
    password: String,
    #[serde(rename = "rawTx")]
    raw_tx: RawTransaction,
}

fn sign_transaction(state: &NodeState, params: SignTransactionParams) -> RelayResult<Value> {
    let mut raw_tx = params.raw_tx;
    for destination in raw_tx.to.keys() {
        check_trusted(state, destination, &raw_tx.coin.symbol)?;
    }

    state.keystore.wallet(&params.wallet_id)?;
    let key = unlock(state, &params.wallet_id, &params.password)
        .map_err(|e| RelayError::sign_failed(e.message))?;

    info!(
        sid = %raw_tx.sid,
        account_id = %raw_tx.account_id,
        symbol = %raw_tx.coin.symbol,
        fees = %raw_tx.fees,
        "Signing relayed transaction"
    );

    key.sign_raw_transaction(&mut raw_tx)
        .map_err(|e| RelayError::sign_failed(e.to_string()))?;
    Ok(json!({ "signedRawTx": raw_tx }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerAbiParams {
    #[serde(rename = "accountID")]
    account_id: String,
    sid: String,
    contract_address: String,
    #[serde(default, rename = "contractABI")]
    contract_abi: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    abi_param: Vec<String>,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    fee_rate: String,
    #[serde(default)]
    raw: String,
    #[serde(default)]
    raw_type: u64,
    #[serde(default)]
    await_result: bool,
}

async fn trigger_abi(state: &NodeState, params: TriggerAbiParams) -> RelayResult<Value> {
    let account = state.ledger.get_account(&params.account_id).await?;
    check_trusted(state, &params.contract_address, &account.symbol)?;

    let key = unlock(state, &account.wallet_id, &params.password)?;

    let contract_id = state
        .ledger
        .get_token_balance(&account.account_id, &params.contract_address)
        .await
        .map(|t| t.contract_id)
        .unwrap_or_default();

    let mut raw_tx = state
        .ledger
        .create_smart_contract_trade(&ContractCallRequest {
            account_id: account.account_id.clone(),
            sid: params.sid,
            coin: Coin::token(account.symbol.clone(), contract_id),
            contract_address: params.contract_address.clone(),
            contract_abi: params.contract_abi,
            abi_param: params.abi_param,
            raw: params.raw,
            raw_type: params.raw_type,
            fee_rate: params.fee_rate,
            amount: params.amount,
            await_result: params.await_result,
        })
        .await?;

    info!(
        sid = %raw_tx.sid,
        account_id = %account.account_id,
        contract = %params.contract_address,
        "Relayed contract call"
    );

    key.sign_raw_transaction(&mut raw_tx)
        .map_err(|e| RelayError::sign_failed(e.to_string()))?;
    let result = submitted(
        state
            .ledger
            .submit_smart_contract_trade(vec![raw_tx])
            .await?,
    )?;
    match result.success.into_iter().next() {
        Some(tx) => to_json(&tx),
        None => Ok(Value::Null),
    }
}

#[derive(Deserialize)]
struct SignHashParams {
    #[serde(rename = "walletID")]
    wallet_id: String,
    message: String,
    #[serde(default)]
    password: String,
}

fn sign_hash(state: &NodeState, params: SignHashParams) -> RelayResult<Value> {
    let key = unlock(state, &params.wallet_id, &params.password)?;
    let signature = key
        .sign_hash(&params.message)
        .map_err(|e| RelayError::sign_failed(e.to_string()))?;
    Ok(json!({ "signature": signature }))
}

// =============================================================================
// Consolidation
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetSummaryInfoParams {
    summary_setting: SummarySetting,
}

fn set_summary_info(state: &NodeState, params: SetSummaryInfoParams) -> RelayResult<Value> {
    let setting = params.summary_setting;
    if setting.account_id.is_empty() || setting.sum_address.is_empty() {
        return Err(RelayError::summary_setting_failed(
            "summary setting needs accountID and sumAddress",
        ));
    }

    if state.db.get_summary_setting(&setting.account_id)?.is_some() {
        return Err(RelayError::summary_setting_failed(
            "summary setting has been initialized",
        ));
    }

    state
        .db
        .save_summary_setting(&setting)
        .map_err(|_| RelayError::summary_setting_failed("summary info save failed"))?;
    info!(account_id = %setting.account_id, sum_address = %setting.sum_address, "Summary setting saved");
    Ok(Value::Null)
}

#[derive(Deserialize)]
struct FindSummaryInfoParams {
    #[serde(rename = "walletID")]
    wallet_id: String,
}

fn find_summary_info(state: &NodeState, params: FindSummaryInfoParams) -> RelayResult<Value> {
    to_json(&state.db.find_summary_settings_by_wallet(&params.wallet_id)?)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSummaryTaskParams {
    summary_task: ConsolidationTask,
    cycle_sec: i64,
    #[serde(default)]
    operate_type: Option<OperateType>,
}

async fn start_summary_task(state: &NodeState, params: StartSummaryTaskParams) -> RelayResult<Value> {
    let Ok(cycle_sec) = u64::try_from(params.cycle_sec) else {
        return Err(RelayError::unknown("cycleSec must be greater than 0"));
    };
    if cycle_sec == 0 {
        return Err(RelayError::unknown("cycleSec must be greater than 0"));
    }

    let mode = params.operate_type.unwrap_or(OperateType::Reset);
    let started = state
        .start_consolidation(params.summary_task, mode, Duration::from_secs(cycle_sec))
        .await
        .map_err(|e| RelayError::unknown(e.to_string()))?;

    if started {
        info!(cycle_sec, "Consolidation timer started by relay");
    }
    Ok(Value::Null)
}

fn stop_summary_task(state: &NodeState) -> RelayResult<Value> {
    if state.scheduler.stop() {
        info!("Consolidation timer stopped by relay");
    }
    Ok(Value::Null)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendSummaryTaskParams {
    summary_task: ConsolidationTask,
}

async fn append_summary_task(
    state: &NodeState,
    params: AppendSummaryTaskParams,
) -> RelayResult<Value> {
    require_timer(state)?;
    state
        .append_consolidation(params.summary_task)
        .await
        .map_err(|e| RelayError::unknown(e.to_string()))?;
    Ok(Value::Null)
}

#[derive(Deserialize)]
struct RemoveSummaryTaskParams {
    #[serde(rename = "walletID")]
    wallet_id: String,
    #[serde(default, rename = "accountID")]
    account_id: String,
}

fn remove_summary_task(state: &NodeState, params: RemoveSummaryTaskParams) -> RelayResult<Value> {
    require_timer(state)?;
    state.tasks.remove(&params.wallet_id, &params.account_id);
    Ok(Value::Null)
}

fn current_summary_task(state: &NodeState) -> RelayResult<Value> {
    require_timer(state)?;
    to_json(&state.tasks.current_redacted())
}

#[derive(Deserialize)]
struct SummaryTaskLogParams {
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: i64,
}

fn summary_task_log(state: &NodeState, params: SummaryTaskLogParams) -> RelayResult<Value> {
    let offset = usize::try_from(params.offset).unwrap_or(0);
    let limit = match usize::try_from(params.limit) {
        Ok(0) | Err(_) => usize::MAX,
        Ok(limit) => limit,
    };
    to_json(&state.db.list_consolidation_logs(offset, limit)?)
}
