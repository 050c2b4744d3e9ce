// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Starknet node access.
//!
//! [`ChainProvider`] is the narrow view of a node the wallet core needs.
//! [`JsonRpcProvider`] implements it over the starknet-rs JSON-RPC client;
//! failures are mapped onto [`WalletError`] once, here.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use starknet::core::types::{
    BlockId, BlockTag, BroadcastedDeployAccountTransactionV3, BroadcastedInvokeTransactionV3,
    BroadcastedTransaction, ContractExecutionError, ExecutionResult, FeeEstimate, Felt,
    FunctionCall, SimulationFlagForEstimateFee, StarknetError, TransactionFinalityStatus,
    TransactionReceiptWithBlockInfo,
};
use starknet::providers::jsonrpc::{
    HttpTransport, HttpTransportError, JsonRpcClientError, JsonRpcError,
};
use starknet::providers::{JsonRpcClient, Provider, ProviderError};
use tracing::debug;
use url::Url;

use super::types::{felt_hex, Call};
use crate::error::{WalletError, WalletResult};

/// Per-request deadline for node calls.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(15);

/// Execution and finality of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// Hash the receipt belongs to
    pub transaction_hash: Felt,
    /// Succeeded, or reverted with the revert reason
    pub execution: ExecutionResult,
    /// Accepted on L2 or on L1
    pub finality: TransactionFinalityStatus,
}

impl From<&TransactionReceiptWithBlockInfo> for TransactionOutcome {
    fn from(receipt: &TransactionReceiptWithBlockInfo) -> Self {
        Self {
            transaction_hash: *receipt.receipt.transaction_hash(),
            execution: receipt.receipt.execution_result().clone(),
            finality: *receipt.receipt.finality_status(),
        }
    }
}

/// Read and submit access to a Starknet node.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Chain ID the node serves (`SN_SEPOLIA`, `SN_MAIN` as felts).
    async fn chain_id(&self) -> WalletResult<Felt>;

    /// Class hash deployed at `address`; `NotDeployed` if there is none.
    async fn get_class_hash_at(&self, address: Felt) -> WalletResult<Felt>;

    /// Account nonce; `NotDeployed` if the contract does not exist.
    async fn get_nonce(&self, address: Felt) -> WalletResult<Felt>;

    /// Read-only contract call against the configured block.
    async fn call(&self, call: &Call) -> WalletResult<Vec<Felt>>;

    /// Simulation failures are `ChainRejected`.
    async fn estimate_fee(
        &self,
        transaction: &BroadcastedTransaction,
        flags: &[SimulationFlagForEstimateFee],
    ) -> WalletResult<FeeEstimate>;

    /// Broadcast a signed invoke and return its hash.
    async fn add_invoke_transaction(
        &self,
        transaction: &BroadcastedInvokeTransactionV3,
    ) -> WalletResult<Felt>;

    /// Returns `(transaction_hash, contract_address)`.
    async fn add_deploy_account_transaction(
        &self,
        transaction: &BroadcastedDeployAccountTransactionV3,
    ) -> WalletResult<(Felt, Felt)>;

    /// `None` while the node does not know the transaction yet.
    async fn get_transaction_receipt(&self, hash: Felt) -> WalletResult<Option<TransactionOutcome>>;
}

/// Human-readable form of a node error, including revert data when present.
pub fn describe_starknet_error(error: &StarknetError) -> String {
    fn execution_error(error: &ContractExecutionError) -> String {
        match error {
            ContractExecutionError::Message(message) => message.clone(),
            ContractExecutionError::Nested(inner) => format!(
                "{} in {}: {}",
                felt_hex(&inner.selector),
                felt_hex(&inner.contract_address),
                execution_error(&inner.error)
            ),
        }
    }
    match error {
        StarknetError::ContractError(data) => {
            format!("{}: {}", error.message(), execution_error(&data.revert_error))
        }
        StarknetError::TransactionExecutionError(data) => format!(
            "{} (transaction {}): {}",
            error.message(),
            data.transaction_index,
            execution_error(&data.execution_error)
        ),
        StarknetError::ValidationFailure(detail)
        | StarknetError::CompilationFailed(detail)
        | StarknetError::UnexpectedError(detail) => format!("{}: {detail}", error.message()),
        other => other.message().to_string(),
    }
}

/// `message (code): data` for a JSON-RPC error object.
pub fn describe_json_rpc_error(error: &JsonRpcError) -> String {
    match &error.data {
        Some(serde_json::Value::String(detail)) => {
            format!("{} ({}): {detail}", error.message, error.code)
        }
        Some(serde_json::Value::Null) | None => format!("{} ({})", error.message, error.code),
        Some(data) => format!("{} ({}): {data}", error.message, error.code),
    }
}

fn client_error<T>(
    error: &JsonRpcClientError<T>,
    submission: bool,
    transport: impl FnOnce(&T) -> WalletError,
) -> WalletError {
    match error {
        JsonRpcClientError::TransportError(inner) => transport(inner),
        JsonRpcClientError::JsonError(e) => {
            WalletError::provider(502, format!("invalid node response: {e}"))
        }
        JsonRpcClientError::JsonRpcError(e) => {
            let message = describe_json_rpc_error(e);
            if submission {
                WalletError::ChainRejected(message)
            } else {
                WalletError::provider(502, message)
            }
        }
    }
}

fn http_transport_error(error: &HttpTransportError) -> WalletError {
    match error {
        HttpTransportError::Reqwest(e) => match e.status() {
            Some(status) => WalletError::provider(status.as_u16(), e.to_string()),
            None => WalletError::NetworkError(e.to_string()),
        },
        other => WalletError::provider(502, other.to_string()),
    }
}

/// Map a starknet-rs provider failure. `submission` marks requests that ask
/// the chain to accept a transaction, simulations included: node errors on
/// those are rejections rather than provider faults.
pub fn wallet_error(error: ProviderError, submission: bool) -> WalletError {
    match error {
        ProviderError::StarknetError(e) => {
            let message = describe_starknet_error(&e);
            if submission {
                WalletError::ChainRejected(message)
            } else {
                WalletError::provider(502, message)
            }
        }
        ProviderError::RateLimited => WalletError::provider(429, "Request rate limited"),
        ProviderError::ArrayLengthMismatch => {
            WalletError::provider(502, "node returned an unexpected number of results")
        }
        ProviderError::Other(inner) => {
            let any = inner.as_any();
            if let Some(e) = any.downcast_ref::<JsonRpcClientError<WalletError>>() {
                return client_error(e, submission, WalletError::clone);
            }
            if let Some(e) = any.downcast_ref::<JsonRpcClientError<HttpTransportError>>() {
                return client_error(e, submission, http_transport_error);
            }
            WalletError::provider(502, inner.to_string())
        }
    }
}

fn not_deployed_or(error: ProviderError, address: Felt) -> WalletError {
    match error {
        ProviderError::StarknetError(StarknetError::ContractNotFound) => {
            WalletError::NotDeployed(felt_hex(&address))
        }
        other => wallet_error(other, false),
    }
}

/// JSON-RPC backed [`ChainProvider`].
pub struct JsonRpcProvider {
    /// starknet-rs client over HTTP
    client: JsonRpcClient<HttpTransport>,
    /// Node URL as configured
    url: String,
    /// Block reads are made against
    block: BlockTag,
    /// Deadline applied to every request
    timeout: Duration,
}

impl std::fmt::Debug for JsonRpcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcProvider")
            .field("url", &self.url)
            .field("block", &self.block)
            .finish()
    }
}

impl JsonRpcProvider {
    /// Connect to `rpc_url`. No request is made until first use.
    pub fn new(rpc_url: &str, block: BlockTag) -> WalletResult<Self> {
        let url = Url::parse(rpc_url)
            .map_err(|e| WalletError::InvalidArgument(format!("Invalid RPC URL {rpc_url}: {e}")))?;
        Ok(Self {
            client: JsonRpcClient::new(HttpTransport::new(url)),
            url: rpc_url.to_string(),
            block,
            timeout: DEFAULT_RPC_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn block(&self) -> BlockTag {
        self.block
    }

    fn block_id(&self) -> BlockId {
        BlockId::Tag(self.block)
    }

    /// Run one request under the deadline. The inner result is left to the
    /// caller, which knows how node errors map for this method.
    async fn send<T>(
        &self,
        method: &'static str,
        request: impl Future<Output = Result<T, ProviderError>>,
    ) -> WalletResult<Result<T, ProviderError>> {
        debug!(method, url = %self.url, "Starknet RPC request");
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                WalletError::NetworkError(format!(
                    "{method} timed out after {}s",
                    self.timeout.as_secs()
                ))
            })
    }
}

#[async_trait]
impl ChainProvider for JsonRpcProvider {
    async fn chain_id(&self) -> WalletResult<Felt> {
        self.send("starknet_chainId", self.client.chain_id())
            .await?
            .map_err(|e| wallet_error(e, false))
    }

    async fn get_class_hash_at(&self, address: Felt) -> WalletResult<Felt> {
        self.send(
            "starknet_getClassHashAt",
            self.client.get_class_hash_at(self.block_id(), address),
        )
        .await?
        .map_err(|e| not_deployed_or(e, address))
    }

    async fn get_nonce(&self, address: Felt) -> WalletResult<Felt> {
        self.send("starknet_getNonce", self.client.get_nonce(self.block_id(), address))
            .await?
            .map_err(|e| not_deployed_or(e, address))
    }

    async fn call(&self, call: &Call) -> WalletResult<Vec<Felt>> {
        let request = FunctionCall {
            contract_address: call.contract_address,
            entry_point_selector: call.selector()?,
            calldata: call.calldata.clone(),
        };
        self.send("starknet_call", self.client.call(request, self.block_id()))
            .await?
            .map_err(|e| wallet_error(e, false))
    }

    async fn estimate_fee(
        &self,
        transaction: &BroadcastedTransaction,
        flags: &[SimulationFlagForEstimateFee],
    ) -> WalletResult<FeeEstimate> {
        self.send(
            "starknet_estimateFee",
            self.client
                .estimate_fee_single(transaction, flags, self.block_id()),
        )
        .await?
        .map_err(|e| wallet_error(e, true))
    }

    /// Broadcast a signed invoke and return its hash.
    async fn add_invoke_transaction(
        &self,
        transaction: &BroadcastedInvokeTransactionV3,
    ) -> WalletResult<Felt> {
        self.send(
            "starknet_addInvokeTransaction",
            self.client.add_invoke_transaction(transaction),
        )
        .await?
        .map(|result| result.transaction_hash)
        .map_err(|e| wallet_error(e, true))
    }

    async fn add_deploy_account_transaction(
        &self,
        transaction: &BroadcastedDeployAccountTransactionV3,
    ) -> WalletResult<(Felt, Felt)> {
        self.send(
            "starknet_addDeployAccountTransaction",
            self.client.add_deploy_account_transaction(transaction),
        )
        .await?
        .map(|result| (result.transaction_hash, result.contract_address))
        .map_err(|e| wallet_error(e, true))
    }

    async fn get_transaction_receipt(&self, hash: Felt) -> WalletResult<Option<TransactionOutcome>> {
        match self
            .send(
                "starknet_getTransactionReceipt",
                self.client.get_transaction_receipt(hash),
            )
            .await?
        {
            Ok(receipt) => Ok(Some(TransactionOutcome::from(&receipt))),
            Err(ProviderError::StarknetError(StarknetError::TransactionHashNotFound)) => Ok(None),
            Err(e) => Err(wallet_error(e, false)),
        }
    }
}

/// Process-wide provider connections keyed by `rpc_url|block`.
#[derive(Default)]
pub struct ProviderCache {
    providers: Mutex<HashMap<String, Arc<JsonRpcProvider>>>,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(rpc_url: &str, block: BlockTag) -> String {
        let block = match block {
            BlockTag::Latest => "latest",
            BlockTag::Pending => "pending",
        };
        format!("{rpc_url}|{block}")
    }

    pub fn get_or_create(&self, rpc_url: &str, block: BlockTag) -> WalletResult<Arc<JsonRpcProvider>> {
        let key = Self::key(rpc_url, block);
        let mut providers = self
            .providers
            .lock()
            .map_err(|_| WalletError::NetworkError("provider cache poisoned".into()))?;
        if let Some(provider) = providers.get(&key) {
            return Ok(Arc::clone(provider));
        }
        let provider = Arc::new(JsonRpcProvider::new(rpc_url, block)?);
        providers.insert(key, Arc::clone(&provider));
        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.providers.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use starknet::core::types::{
        ContractErrorData, ExecutionResources, FeePayment, InvokeTransactionReceipt, PriceUnit,
        ReceiptBlock, TransactionReceipt,
    };

    #[test]
    fn provider_cache_reuses_connections() {
        let cache = ProviderCache::new();
        let a = cache.get_or_create("https://rpc.example", BlockTag::Latest).unwrap();
        let b = cache.get_or_create("https://rpc.example", BlockTag::Latest).unwrap();
        let c = cache.get_or_create("https://rpc.example", BlockTag::Pending).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.len(), 2);
        assert_eq!(c.block(), BlockTag::Pending);
        assert_eq!(a.url(), "https://rpc.example");
        assert!(cache.get_or_create("nope", BlockTag::Latest).is_err());
    }

    #[test]
    fn receipt_outcome_keeps_revert_reason() {
        let receipt = TransactionReceiptWithBlockInfo {
            receipt: TransactionReceipt::Invoke(InvokeTransactionReceipt {
                transaction_hash: Felt::ONE,
                actual_fee: FeePayment {
                    amount: Felt::from(0x10u64),
                    unit: PriceUnit::Fri,
                },
                finality_status: TransactionFinalityStatus::AcceptedOnL2,
                messages_sent: vec![],
                events: vec![],
                execution_resources: ExecutionResources {
                    l1_gas: 0,
                    l1_data_gas: 128,
                    l2_gas: 9_000,
                },
                execution_result: ExecutionResult::Reverted {
                    reason: "u256_sub Overflow".into(),
                },
            }),
            block: ReceiptBlock::Block {
                block_hash: Felt::TWO,
                block_number: 7,
            },
        };
        let outcome = TransactionOutcome::from(&receipt);
        assert_eq!(outcome.transaction_hash, Felt::ONE);
        assert_eq!(outcome.execution.revert_reason(), Some("u256_sub Overflow"));
        assert_eq!(outcome.finality, TransactionFinalityStatus::AcceptedOnL2);
    }

    #[test]
    fn contract_not_found_maps_to_not_deployed() {
        let error = ProviderError::StarknetError(StarknetError::ContractNotFound);
        assert!(matches!(
            not_deployed_or(error, Felt::ONE),
            WalletError::NotDeployed(addr) if addr == "0x1"
        ));
        assert!(matches!(
            not_deployed_or(ProviderError::RateLimited, Felt::ONE),
            WalletError::ProviderError { status: 429, .. }
        ));
    }

    #[test]
    fn node_errors_are_rejections_only_for_submissions() {
        let validation = || {
            ProviderError::StarknetError(StarknetError::ValidationFailure(
                "invalid signature".into(),
            ))
        };
        match wallet_error(validation(), true) {
            WalletError::ChainRejected(message) => {
                assert_eq!(message, "Account validation failed: invalid signature")
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            wallet_error(validation(), false),
            WalletError::ProviderError { status: 502, .. }
        ));

        let reverted = ProviderError::StarknetError(StarknetError::ContractError(ContractErrorData {
            revert_error: ContractExecutionError::Message("u256_sub Overflow".into()),
        }));
        match wallet_error(reverted, true) {
            WalletError::ChainRejected(message) => assert!(message.ends_with("u256_sub Overflow")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_json_rpc_errors_keep_code_and_data() {
        let error: ProviderError = JsonRpcClientError::<HttpTransportError>::JsonRpcError(JsonRpcError {
            code: 63,
            message: "An unexpected error occurred".into(),
            data: Some(json!("node overloaded")),
        })
        .into();
        match wallet_error(error, false) {
            WalletError::ProviderError { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "An unexpected error occurred (63): node overloaded");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn wallet_errors_survive_the_client() {
        let error: ProviderError =
            JsonRpcClientError::TransportError(WalletError::NetworkError("connection refused".into()))
                .into();
        assert!(matches!(
            wallet_error(error, true),
            WalletError::NetworkError(message) if message == "connection refused"
        ));
    }
}
