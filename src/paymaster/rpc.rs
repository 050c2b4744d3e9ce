// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! SNIP-29 paymaster JSON-RPC client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use starknet::core::types::Felt;
use starknet::providers::jsonrpc::JsonRpcResponse;
use tracing::debug;

use super::negotiator::FeeMode;
use crate::blockchain::rpc::describe_json_rpc_error;
use crate::blockchain::types::{felt_hex, parse_felt, Call};
use crate::config::PaymasterConfig;
use crate::error::{WalletError, WalletResult};

const API_KEY_HEADER: &str = "x-paymaster-api-key";
/// Per-request deadline for paymaster calls.
pub const PAYMASTER_TIMEOUT: Duration = Duration::from_secs(15);
/// Version of the execution parameters object.
const PARAMETERS_VERSION: &str = "0x1";
/// Version of the deployment data object.
const DEPLOYMENT_VERSION: u8 = 1;

/// Gas token accepted by the paymaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenData {
    pub token_address: Felt,
    pub decimals: u8,
    pub price_in_strk: u128,
}

/// Fee quote attached to a built transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaymasterFeeEstimate {
    pub gas_token_price_in_strk: u128,
    pub estimated_fee_in_strk: u128,
    pub estimated_fee_in_gas_token: u128,
    pub suggested_max_fee_in_strk: u128,
    pub suggested_max_fee_in_gas_token: u128,
}

/// Counterfactual deployment as understood by the paymaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentData {
    pub address: Felt,
    pub class_hash: Felt,
    pub salt: Felt,
    pub calldata: Vec<Felt>,
    pub sigdata: Option<Vec<Felt>>,
}

impl DeploymentData {
    fn to_json(&self) -> Value {
        let mut value = json!({
            "address": felt_hex(&self.address),
            "class_hash": felt_hex(&self.class_hash),
            "salt": felt_hex(&self.salt),
            "calldata": self.calldata.iter().map(felt_hex).collect::<Vec<_>>(),
            "version": DEPLOYMENT_VERSION,
        });
        if let Some(sigdata) = &self.sigdata {
            value["sigdata"] = json!(sigdata.iter().map(felt_hex).collect::<Vec<_>>());
        }
        value
    }
}

fn calls_json(calls: &[Call]) -> WalletResult<Vec<Value>> {
    calls
        .iter()
        .map(|call| {
            Ok(json!({
                "to": felt_hex(&call.contract_address),
                "selector": felt_hex(&call.selector()?),
                "calldata": call.calldata.iter().map(felt_hex).collect::<Vec<_>>(),
            }))
        })
        .collect()
}

/// Transaction submitted to `paymaster_buildTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymasterTransaction {
    Deploy(DeploymentData),
    Invoke {
        user_address: Felt,
        calls: Vec<Call>,
    },
    DeployAndInvoke {
        deployment: DeploymentData,
        user_address: Felt,
        calls: Vec<Call>,
    },
}

impl PaymasterTransaction {
    pub fn kind(&self) -> &'static str {
        match self {
            PaymasterTransaction::Deploy(_) => "deploy",
            PaymasterTransaction::Invoke { .. } => "invoke",
            PaymasterTransaction::DeployAndInvoke { .. } => "deploy_and_invoke",
        }
    }

    fn to_json(&self) -> WalletResult<Value> {
        Ok(match self {
            PaymasterTransaction::Deploy(deployment) => json!({
                "type": self.kind(),
                "deployment": deployment.to_json(),
            }),
            PaymasterTransaction::Invoke { user_address, calls } => json!({
                "type": self.kind(),
                "invoke": {
                    "user_address": felt_hex(user_address),
                    "calls": calls_json(calls)?,
                },
            }),
            PaymasterTransaction::DeployAndInvoke {
                deployment,
                user_address,
                calls,
            } => json!({
                "type": self.kind(),
                "deployment": deployment.to_json(),
                "invoke": {
                    "user_address": felt_hex(user_address),
                    "calls": calls_json(calls)?,
                },
            }),
        })
    }
}

/// Result of `paymaster_buildTransaction`.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltTransaction {
    pub kind: String,
    /// SNIP-12 typed data to sign; absent for pure deployments.
    pub typed_data: Option<Value>,
    pub fee: PaymasterFeeEstimate,
}

/// Signed transaction for `paymaster_executeTransaction`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutableTransaction {
    Deploy(DeploymentData),
    Invoke {
        user_address: Felt,
        typed_data: Value,
        signature: Vec<Felt>,
    },
    DeployAndInvoke {
        deployment: DeploymentData,
        user_address: Felt,
        typed_data: Value,
        signature: Vec<Felt>,
    },
}

impl ExecutableTransaction {
    fn to_json(&self) -> Value {
        fn invoke(user_address: &Felt, typed_data: &Value, signature: &[Felt]) -> Value {
            json!({
                "user_address": felt_hex(user_address),
                "typed_data": typed_data,
                "signature": signature.iter().map(felt_hex).collect::<Vec<_>>(),
            })
        }
        match self {
            ExecutableTransaction::Deploy(deployment) => json!({
                "type": "deploy",
                "deployment": deployment.to_json(),
            }),
            ExecutableTransaction::Invoke {
                user_address,
                typed_data,
                signature,
            } => json!({
                "type": "invoke",
                "invoke": invoke(user_address, typed_data, signature),
            }),
            ExecutableTransaction::DeployAndInvoke {
                deployment,
                user_address,
                typed_data,
                signature,
            } => json!({
                "type": "deploy_and_invoke",
                "deployment": deployment.to_json(),
                "invoke": invoke(user_address, typed_data, signature),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteResponse {
    pub transaction_hash: Felt,
    pub tracking_id: Felt,
}

fn parameters_json(fee_mode: &FeeMode) -> Value {
    let fee_mode = match fee_mode {
        FeeMode::Sponsored => json!({ "mode": "sponsored" }),
        FeeMode::SelfPaid { gas_token } => json!({
            "mode": "default",
            "gas_token": felt_hex(gas_token),
        }),
    };
    json!({ "version": PARAMETERS_VERSION, "fee_mode": fee_mode })
}

/// Integer quantity encoded as a JSON number, hex string or decimal string.
fn quantity(value: Option<&Value>) -> Option<u128> {
    match value? {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                u128::from_str_radix(hex, 16).ok()
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

fn required_quantity(value: &Value, field: &str) -> WalletResult<u128> {
    quantity(value.get(field))
        .ok_or_else(|| WalletError::provider(502, format!("paymaster response missing `{field}`")))
}

fn parse_fee(value: &Value) -> WalletResult<PaymasterFeeEstimate> {
    Ok(PaymasterFeeEstimate {
        gas_token_price_in_strk: required_quantity(value, "gas_token_price_in_strk")?,
        estimated_fee_in_strk: required_quantity(value, "estimated_fee_in_strk")?,
        estimated_fee_in_gas_token: required_quantity(value, "estimated_fee_in_gas_token")?,
        suggested_max_fee_in_strk: required_quantity(value, "suggested_max_fee_in_strk")?,
        suggested_max_fee_in_gas_token: required_quantity(value, "suggested_max_fee_in_gas_token")?,
    })
}

fn parse_built(value: &Value) -> WalletResult<BuiltTransaction> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let fee = value
        .get("fee")
        .ok_or_else(|| WalletError::provider(502, "paymaster response missing `fee`"))?;
    Ok(BuiltTransaction {
        kind,
        typed_data: value.get("typed_data").cloned(),
        fee: parse_fee(fee)?,
    })
}

fn parse_tokens(value: &Value) -> WalletResult<Vec<TokenData>> {
    let entries = value
        .as_array()
        .ok_or_else(|| WalletError::provider(502, "supported tokens is not a list"))?;
    entries
        .iter()
        .map(|entry| {
            let address = entry
                .get("token_address")
                .and_then(Value::as_str)
                .ok_or_else(|| WalletError::provider(502, "token entry missing address"))?;
            Ok(TokenData {
                token_address: parse_felt(address)?,
                decimals: quantity(entry.get("decimals"))
                    .and_then(|d| u8::try_from(d).ok())
                    .unwrap_or(18),
                price_in_strk: quantity(entry.get("price_in_strk")).unwrap_or(0),
            })
        })
        .collect()
}

/// SNIP-29 paymaster operations.
#[async_trait]
pub trait PaymasterRpc: Send + Sync {
    async fn is_available(&self) -> WalletResult<bool>;

    async fn get_supported_tokens(&self) -> WalletResult<Vec<TokenData>>;

    async fn build_transaction(
        &self,
        transaction: &PaymasterTransaction,
        fee_mode: &FeeMode,
    ) -> WalletResult<BuiltTransaction>;

    async fn execute_transaction(
        &self,
        transaction: &ExecutableTransaction,
        fee_mode: &FeeMode,
    ) -> WalletResult<ExecuteResponse>;

    /// Fee quote for a transaction, obtained by building it.
    async fn estimate_fee(
        &self,
        transaction: &PaymasterTransaction,
        fee_mode: &FeeMode,
    ) -> WalletResult<PaymasterFeeEstimate> {
        Ok(self.build_transaction(transaction, fee_mode).await?.fee)
    }
}

/// HTTP implementation of [`PaymasterRpc`].
#[derive(Debug)]
pub struct HttpPaymasterRpc {
    url: String,
    http: Client,
    next_id: AtomicU64,
}

impl HttpPaymasterRpc {
    pub fn new(url: &str, api_key: Option<&str>) -> WalletResult<Self> {
        url::Url::parse(url)
            .map_err(|e| WalletError::InvalidArgument(format!("Invalid paymaster URL {url}: {e}")))?;
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key).map_err(|e| {
                WalletError::InvalidArgument(format!("Invalid paymaster API key: {e}"))
            })?;
            headers.insert(API_KEY_HEADER, value);
        }
        let http = Client::builder()
            .timeout(PAYMASTER_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| WalletError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.to_string(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &PaymasterConfig) -> WalletResult<Self> {
        Self::new(&config.url, config.api_key.as_ref().map(|k| k.expose()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One JSON-RPC call. `submission` marks requests whose RPC errors are
    /// rejections of the transaction rather than paymaster faults.
    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        submission: bool,
    ) -> WalletResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "Paymaster request");
        let response = self
            .http
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WalletError::NetworkError(e.to_string()))?;
        if !status.is_success() {
            return Err(WalletError::provider(status.as_u16(), body));
        }
        decode_response(&body, submission)
    }
}

/// Decode a JSON-RPC response body.
fn decode_response<T: DeserializeOwned>(body: &str, submission: bool) -> WalletResult<T> {
    let response: JsonRpcResponse<Value> = serde_json::from_str(body)
        .map_err(|e| WalletError::provider(502, format!("invalid paymaster response: {e}")))?;
    match response {
        JsonRpcResponse::Success { result, .. } => serde_json::from_value(result)
            .map_err(|e| WalletError::provider(502, format!("unexpected paymaster result: {e}"))),
        JsonRpcResponse::Error { error, .. } if submission => {
            Err(WalletError::ChainRejected(describe_json_rpc_error(&error)))
        }
        JsonRpcResponse::Error { error, .. } => {
            Err(WalletError::provider(502, describe_json_rpc_error(&error)))
        }
    }
}

#[async_trait]
impl PaymasterRpc for HttpPaymasterRpc {
    async fn is_available(&self) -> WalletResult<bool> {
        self.request("paymaster_isAvailable", json!([]), false).await
    }

    async fn get_supported_tokens(&self) -> WalletResult<Vec<TokenData>> {
        let value: Value = self
            .request("paymaster_getSupportedTokens", json!([]), false)
            .await?;
        parse_tokens(&value)
    }

    async fn build_transaction(
        &self,
        transaction: &PaymasterTransaction,
        fee_mode: &FeeMode,
    ) -> WalletResult<BuiltTransaction> {
        let params = json!({
            "transaction": transaction.to_json()?,
            "parameters": parameters_json(fee_mode),
        });
        let value: Value = self
            .request("paymaster_buildTransaction", params, false)
            .await?;
        parse_built(&value)
    }

    async fn execute_transaction(
        &self,
        transaction: &ExecutableTransaction,
        fee_mode: &FeeMode,
    ) -> WalletResult<ExecuteResponse> {
        let params = json!({
            "transaction": transaction.to_json(),
            "parameters": parameters_json(fee_mode),
        });
        let value: Value = self
            .request("paymaster_executeTransaction", params, true)
            .await?;
        let field = |name: &str| -> WalletResult<Felt> {
            let raw = value
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| WalletError::provider(502, format!("paymaster response missing `{name}`")))?;
            parse_felt(raw)
        };
        Ok(ExecuteResponse {
            transaction_hash: field("transaction_hash")?,
            tracking_id: field("tracking_id").unwrap_or(Felt::ZERO),
        })
    }
}

/// One paymaster client per process.
#[derive(Default)]
pub struct PaymasterClientCache {
    client: Mutex<Option<Arc<HttpPaymasterRpc>>>,
}

impl PaymasterClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_init(&self, config: &PaymasterConfig) -> WalletResult<Arc<HttpPaymasterRpc>> {
        let mut slot = self
            .client
            .lock()
            .map_err(|_| WalletError::NetworkError("paymaster cache poisoned".into()))?;
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }
        let client = Arc::new(HttpPaymasterRpc::from_config(config)?);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;
    use crate::paymaster::PaymasterMode;
    use crate::test_support::{canned_http_server, truncated_body_server};

    fn deployment() -> DeploymentData {
        DeploymentData {
            address: Felt::from(0xaau64),
            class_hash: Felt::from(0xbbu64),
            salt: Felt::from(0xccu64),
            calldata: vec![Felt::ZERO, Felt::from(0xccu64), Felt::ONE],
            sigdata: None,
        }
    }

    #[test]
    fn fee_mode_parameters() {
        assert_eq!(
            parameters_json(&FeeMode::Sponsored),
            json!({ "version": "0x1", "fee_mode": { "mode": "sponsored" } })
        );
        assert_eq!(
            parameters_json(&FeeMode::SelfPaid { gas_token: Felt::from(0x53u64) }),
            json!({ "version": "0x1", "fee_mode": { "mode": "default", "gas_token": "0x53" } })
        );
    }

    #[test]
    fn deploy_transaction_json() {
        let tx = PaymasterTransaction::Deploy(deployment()).to_json().unwrap();
        assert_eq!(tx["type"], "deploy");
        assert_eq!(tx["deployment"]["address"], "0xaa");
        assert_eq!(tx["deployment"]["calldata"], json!(["0x0", "0xcc", "0x1"]));
        assert_eq!(tx["deployment"]["version"], 1);
        assert!(tx["deployment"].get("sigdata").is_none());
    }

    #[test]
    fn invoke_transaction_keeps_call_order() {
        let calls = vec![
            Call::new(Felt::from(2u64), "b", vec![]),
            Call::new(Felt::from(1u64), "a", vec![Felt::ONE]),
        ];
        let tx = PaymasterTransaction::Invoke {
            user_address: Felt::from(9u64),
            calls,
        }
        .to_json()
        .unwrap();
        assert_eq!(tx["invoke"]["user_address"], "0x9");
        assert_eq!(tx["invoke"]["calls"][0]["to"], "0x2");
        assert_eq!(tx["invoke"]["calls"][1]["to"], "0x1");
        assert_eq!(tx["invoke"]["calls"][1]["calldata"], json!(["0x1"]));
    }

    #[test]
    fn executable_invoke_json() {
        let tx = ExecutableTransaction::Invoke {
            user_address: Felt::from(9u64),
            typed_data: json!({ "domain": {} }),
            signature: vec![Felt::ONE, Felt::TWO],
        }
        .to_json();
        assert_eq!(tx["type"], "invoke");
        assert_eq!(tx["invoke"]["signature"], json!(["0x1", "0x2"]));
    }

    #[test]
    fn parses_build_response() {
        let built = parse_built(&json!({
            "type": "invoke",
            "typed_data": { "primaryType": "OutsideExecution" },
            "parameters": {},
            "fee": {
                "gas_token_price_in_strk": "0x1",
                "estimated_fee_in_strk": "0x64",
                "estimated_fee_in_gas_token": "0x64",
                "suggested_max_fee_in_strk": "0x12c",
                "suggested_max_fee_in_gas_token": "0x12c"
            }
        }))
        .unwrap();
        assert_eq!(built.kind, "invoke");
        assert!(built.typed_data.is_some());
        assert_eq!(built.fee.suggested_max_fee_in_gas_token, 300);

        assert!(parse_built(&json!({ "type": "invoke" })).is_err());
    }

    #[test]
    fn parses_supported_tokens() {
        let tokens = parse_tokens(&json!([
            { "token_address": "0x53", "decimals": 18, "price_in_strk": "0xde0b6b3a7640000" },
            { "token_address": "0x54", "decimals": "0x6", "price_in_strk": "5" }
        ]))
        .unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].token_address, Felt::from(0x53u64));
        assert_eq!(tokens[0].price_in_strk, 1_000_000_000_000_000_000);
        assert_eq!(tokens[1].decimals, 6);
        assert!(parse_tokens(&json!({})).is_err());
    }

    #[test]
    fn decodes_results_and_error_objects() {
        let value: String = decode_response(
            r#"{ "jsonrpc": "2.0", "id": 1, "result": "0x534e5f5345504f4c4941" }"#,
            false,
        )
        .unwrap();
        assert_eq!(value, "0x534e5f5345504f4c4941");

        let error = r#"{ "jsonrpc": "2.0", "id": 1,
            "error": { "code": 156, "message": "Invalid signature", "data": "bad r" } }"#;
        match decode_response::<Value>(error, true) {
            Err(WalletError::ChainRejected(message)) => {
                assert_eq!(message, "Invalid signature (156): bad r")
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            decode_response::<Value>(error, false),
            Err(WalletError::ProviderError { status: 502, .. })
        ));
        assert!(matches!(
            decode_response::<Value>("{ not json", false),
            Err(WalletError::ProviderError { status: 502, .. })
        ));
    }

    #[tokio::test]
    async fn truncated_bodies_are_network_errors() {
        let url = truncated_body_server().await;
        let rpc = HttpPaymasterRpc::new(&url, Some("k")).unwrap();
        assert!(matches!(
            rpc.is_available().await,
            Err(WalletError::NetworkError(_))
        ));
    }

    #[tokio::test]
    async fn http_failures_keep_status_and_body() {
        let url = canned_http_server(503, "paymaster down").await;
        let rpc = HttpPaymasterRpc::new(&url, None).unwrap();
        match rpc.get_supported_tokens().await {
            Err(WalletError::ProviderError { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "paymaster down");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_urls_and_keys() {
        assert!(HttpPaymasterRpc::new("not a url", None).is_err());
        assert!(HttpPaymasterRpc::new("https://paymaster.example", Some("bad\nkey")).is_err());
    }

    #[test]
    fn client_cache_is_a_singleton() {
        let cache = PaymasterClientCache::new();
        let config = PaymasterConfig {
            url: "https://paymaster.example".into(),
            mode: PaymasterMode::Sponsored,
            api_key: Some(Secret::new("k")),
            gas_token: Felt::ONE,
        };
        let a = cache.get_or_init(&config).unwrap();
        let b = cache.get_or_init(&config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.url(), "https://paymaster.example");
    }
}
