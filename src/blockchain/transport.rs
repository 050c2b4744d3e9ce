// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! starknet-rs transport over a [`ChainProvider`].
//!
//! The accounts and factories in `starknet::accounts` talk to a
//! `JsonRpcClient`. [`ChainTransport`] answers the handful of methods they
//! use from any [`ChainProvider`], so the real node and the in-memory chain
//! used by tests go through the same transaction building code.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use starknet::core::types::requests::{
    AddDeployAccountTransactionRequest, AddInvokeTransactionRequest, EstimateFeeRequest,
    GetClassHashAtRequest, GetNonceRequest,
};
use starknet::core::types::{DeployAccountTransactionResult, InvokeTransactionResult};
use starknet::providers::jsonrpc::{
    JsonRpcError, JsonRpcMethod, JsonRpcResponse, JsonRpcTransport,
};
use starknet::providers::{JsonRpcClient, ProviderRequestData};

use super::rpc::ChainProvider;
use crate::error::{WalletError, WalletResult};

/// Node error code for `CONTRACT_NOT_FOUND`.
const CONTRACT_NOT_FOUND: i64 = 20;

/// `JsonRpcClient` bound to a [`ChainProvider`].
pub type ChainClient = JsonRpcClient<ChainTransport>;

/// Serves starknet-rs requests from a [`ChainProvider`].
#[derive(Clone)]
pub struct ChainTransport {
    inner: Arc<dyn ChainProvider>,
}

impl ChainTransport {
    pub fn new(inner: Arc<dyn ChainProvider>) -> Self {
        Self { inner }
    }

    pub fn client(inner: Arc<dyn ChainProvider>) -> ChainClient {
        JsonRpcClient::new(Self::new(inner))
    }

    async fn dispatch(&self, method: JsonRpcMethod, params: Value) -> WalletResult<Value> {
        match method {
            JsonRpcMethod::ChainId => encode(self.inner.chain_id().await?),
            JsonRpcMethod::GetNonce => {
                let request: GetNonceRequest = decode(method, params)?;
                encode(self.inner.get_nonce(request.contract_address).await?)
            }
            JsonRpcMethod::GetClassHashAt => {
                let request: GetClassHashAtRequest = decode(method, params)?;
                encode(self.inner.get_class_hash_at(request.contract_address).await?)
            }
            JsonRpcMethod::EstimateFee => {
                let request: EstimateFeeRequest = decode(method, params)?;
                let mut estimates = Vec::with_capacity(request.request.len());
                for transaction in &request.request {
                    estimates.push(
                        self.inner
                            .estimate_fee(transaction, &request.simulation_flags)
                            .await?,
                    );
                }
                encode(estimates)
            }
            JsonRpcMethod::AddInvokeTransaction => {
                let request: AddInvokeTransactionRequest = decode(method, params)?;
                let transaction_hash = self
                    .inner
                    .add_invoke_transaction(&request.invoke_transaction)
                    .await?;
                encode(InvokeTransactionResult { transaction_hash })
            }
            JsonRpcMethod::AddDeployAccountTransaction => {
                let request: AddDeployAccountTransactionRequest = decode(method, params)?;
                let (transaction_hash, contract_address) = self
                    .inner
                    .add_deploy_account_transaction(&request.deploy_account_transaction)
                    .await?;
                encode(DeployAccountTransactionResult {
                    transaction_hash,
                    contract_address,
                })
            }
            other => Err(WalletError::provider(
                501,
                format!("{other:?} is not served by the chain transport"),
            )),
        }
    }
}

fn decode<T: DeserializeOwned>(method: JsonRpcMethod, params: Value) -> WalletResult<T> {
    serde_json::from_value(params)
        .map_err(|e| WalletError::provider(500, format!("invalid {method:?} params: {e}")))
}

fn encode<T: Serialize>(value: T) -> WalletResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| WalletError::provider(500, format!("unencodable result: {e}")))
}

#[async_trait]
impl JsonRpcTransport for ChainTransport {
    type Error = WalletError;

    async fn send_request<P, R>(
        &self,
        method: JsonRpcMethod,
        params: P,
    ) -> Result<JsonRpcResponse<R>, Self::Error>
    where
        P: Serialize + Send + Sync,
        R: DeserializeOwned,
    {
        let params = encode(params)?;
        let result = match self.dispatch(method, params).await {
            Ok(result) => result,
            // The account types read a missing contract from the node error code.
            Err(WalletError::NotDeployed(address)) => {
                return Ok(JsonRpcResponse::Error {
                    id: 1,
                    error: JsonRpcError {
                        code: CONTRACT_NOT_FOUND,
                        message: "Contract not found".into(),
                        data: Some(Value::String(address)),
                    },
                })
            }
            Err(e) => return Err(e),
        };
        let result = serde_json::from_value(result)
            .map_err(|e| WalletError::provider(500, format!("unexpected {method:?} result: {e}")))?;
        Ok(JsonRpcResponse::Success { id: 1, result })
    }

    async fn send_requests<R>(
        &self,
        _requests: R,
    ) -> Result<Vec<JsonRpcResponse<Value>>, Self::Error>
    where
        R: AsRef<[ProviderRequestData]> + Send + Sync,
    {
        Err(WalletError::provider(
            501,
            "batched requests are not served by the chain transport",
        ))
    }
}
