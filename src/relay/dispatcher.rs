// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relay method table.
//!
//! Every inbound call passes the same two gates before its handler runs: the
//! caller's `appID` must equal the configured one, then the method's
//! capability (if it has one) must be enabled.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::handlers;
use crate::config::Capability;
use crate::error::{status, RelayError, RelayResult};
use crate::state::NodeState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayMethod {
    GetTrustNodeInfo,
    CreateWallet,
    CreateAccount,
    SendTransaction,
    SetSummaryInfo,
    FindSummaryInfoByWalletId,
    StartSummaryTask,
    StopSummaryTask,
    AppendSummaryTask,
    RemoveSummaryTask,
    GetCurrentSummaryTask,
    GetSummaryTaskLog,
    GetLocalWalletList,
    GetTrustAddressList,
    SignTransaction,
    TriggerAbi,
    SignHash,
}

impl RelayMethod {
    pub const ALL: [RelayMethod; 17] = [
        RelayMethod::GetTrustNodeInfo,
        RelayMethod::CreateWallet,
        RelayMethod::CreateAccount,
        RelayMethod::SendTransaction,
        RelayMethod::SetSummaryInfo,
        RelayMethod::FindSummaryInfoByWalletId,
        RelayMethod::StartSummaryTask,
        RelayMethod::StopSummaryTask,
        RelayMethod::AppendSummaryTask,
        RelayMethod::RemoveSummaryTask,
        RelayMethod::GetCurrentSummaryTask,
        RelayMethod::GetSummaryTaskLog,
        RelayMethod::GetLocalWalletList,
        RelayMethod::GetTrustAddressList,
        RelayMethod::SignTransaction,
        RelayMethod::TriggerAbi,
        RelayMethod::SignHash,
    ];

    /// Wire name used by control-plane callers.
    pub fn name(&self) -> &'static str {
        match self {
            RelayMethod::GetTrustNodeInfo => "getTrustNodeInfo",
            RelayMethod::CreateWallet => "createWalletViaTrustNode",
            RelayMethod::CreateAccount => "createAccountViaTrustNode",
            RelayMethod::SendTransaction => "sendTransactionViaTrustNode",
            RelayMethod::SetSummaryInfo => "setSummaryInfoViaTrustNode",
            RelayMethod::FindSummaryInfoByWalletId => "findSummaryInfoByWalletIDViaTrustNode",
            RelayMethod::StartSummaryTask => "startSummaryTaskViaTrustNode",
            RelayMethod::StopSummaryTask => "stopSummaryTaskViaTrustNode",
            RelayMethod::AppendSummaryTask => "appendSummaryTaskViaTrustNode",
            RelayMethod::RemoveSummaryTask => "removeSummaryTaskViaTrustNode",
            RelayMethod::GetCurrentSummaryTask => "getCurrentSummaryTaskViaTrustNode",
            RelayMethod::GetSummaryTaskLog => "getSummaryTaskLogViaTrustNode",
            RelayMethod::GetLocalWalletList => "getLocalWalletListViaTrustNode",
            RelayMethod::GetTrustAddressList => "getTrustAddressListViaTrustNode",
            RelayMethod::SignTransaction => "signTransactionViaTrustNode",
            RelayMethod::TriggerAbi => "triggerABIViaTrustNode",
            RelayMethod::SignHash => "signHashViaTrustNode",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// The capability table. Methods returning `None` only need a valid appID.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            RelayMethod::SendTransaction
            | RelayMethod::SignTransaction
            | RelayMethod::TriggerAbi
            | RelayMethod::SignHash => Some(Capability::RemoteTransfer),

            RelayMethod::SetSummaryInfo => Some(Capability::EditConsolidationSettings),

            RelayMethod::StartSummaryTask
            | RelayMethod::StopSummaryTask
            | RelayMethod::AppendSummaryTask
            | RelayMethod::RemoveSummaryTask
            | RelayMethod::GetCurrentSummaryTask
            | RelayMethod::GetSummaryTaskLog => Some(Capability::ExecuteConsolidationTask),

            RelayMethod::GetTrustNodeInfo
            | RelayMethod::CreateWallet
            | RelayMethod::CreateAccount
            | RelayMethod::FindSummaryInfoByWalletId
            | RelayMethod::GetLocalWalletList
            | RelayMethod::GetTrustAddressList => None,
        }
    }
}

/// Inbound call frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelayRequest {
    #[serde(default)]
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Outbound reply frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayResponse {
    pub id: u64,
    pub status: u64,
    pub msg: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub result: Value,
}

#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<NodeState>,
}

impl Dispatcher {
    pub fn new(state: Arc<NodeState>) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Arc<NodeState> {
        &self.state
    }

    /// Run one call through the gates and its handler.
    pub async fn dispatch(&self, method: &str, params: Value) -> RelayResult<Value> {
        let method = RelayMethod::from_name(method)
            .ok_or_else(|| RelayError::unknown(format!("unknown method: {method}")))?;

        let app_id = params.get("appID").and_then(Value::as_str).unwrap_or("");
        if app_id != self.state.config.app_id {
            warn!(method = method.name(), "Relay call with incorrect appID");
            return Err(RelayError::app_id_incorrect());
        }

        if let Some(capability) = method.required_capability() {
            if !self.state.config.capabilities.is_enabled(capability) {
                warn!(method = method.name(), ability = capability.label(), "Relay call for disabled ability");
                return Err(RelayError::ability_disabled(capability));
            }
        }

        debug!(method = method.name(), "Handling relay call");
        handlers::handle(&self.state, method, params).await
    }

    pub async fn handle(&self, request: RelayRequest) -> RelayResponse {
        match self.dispatch(&request.method, request.params).await {
            Ok(result) => RelayResponse {
                id: request.id,
                status: status::SUCCESS,
                msg: "success".to_string(),
                result,
            },
            Err(e) => {
                warn!(method = %request.method, status = e.status, error = %e.message, "Relay call failed");
                RelayResponse {
                    id: request.id,
                    status: e.status,
                    msg: e.message,
                    result: Value::Null,
                }
            }
        }
    }
}
