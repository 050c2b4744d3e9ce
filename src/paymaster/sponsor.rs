// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Legacy sponsorship API used by the operator account.
//!
//! `POST {paymaster_url}/sponsor` approves a set of calls for a sender and
//! returns execution details (paymaster data, tip). The operator then sends
//! an ordinary v3 invoke signed by its own key, which only goes ahead when
//! the approval asks for neither.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use starknet::core::types::Felt;
use tracing::info;

use crate::blockchain::types::{felt_hex, parse_felt, Call};
use crate::error::{WalletError, WalletResult};

const SPONSOR_TIMEOUT: Duration = Duration::from_secs(20);
const API_KEY_HEADER: &str = "X-API-Key";

/// Execution details granted by the sponsor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SponsorApproval {
    /// Paymaster data the sponsor wants in the invoke
    pub paymaster_data: Vec<Felt>,
    /// Tip the sponsor wants in the invoke
    pub tip: u64,
}

/// Sponsorship approval for operator transfers.
#[async_trait]
pub trait Sponsor: Send + Sync {
    async fn request_sponsorship(&self, sender: Felt, calls: &[Call]) -> WalletResult<SponsorApproval>;
}

/// HTTP client for `POST {paymaster_url}/sponsor`.
pub struct SponsorClient {
    endpoint: String,
    api_key: String,
    chain_id_name: String,
    http: Client,
}

impl SponsorClient {
    pub fn new(paymaster_url: &str, api_key: &str, chain_id_name: &str) -> WalletResult<Self> {
        let http = Client::builder()
            .timeout(SPONSOR_TIMEOUT)
            .build()
            .map_err(|e| WalletError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: format!("{}/sponsor", paymaster_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            chain_id_name: chain_id_name.to_string(),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn sponsor_body(chain_id_name: &str, sender: Felt, calls: &[Call]) -> Value {
    json!({
        "chain_id": chain_id_name,
        "sender": felt_hex(&sender),
        "calls": calls
            .iter()
            .map(|c| json!({
                "contract_address": felt_hex(&c.contract_address),
                "entrypoint": c.entrypoint,
                "calldata": c.calldata.iter().map(felt_hex).collect::<Vec<_>>(),
            }))
            .collect::<Vec<_>>(),
    })
}

/// Accepts both camelCase and snake_case approval fields.
fn parse_approval(response: &Value) -> WalletResult<SponsorApproval> {
    let paymaster_data = response
        .pointer("/paymasterData")
        .or_else(|| response.pointer("/paymaster_data"))
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .map(|v| match v {
                    Value::String(s) => parse_felt(s),
                    Value::Number(n) => n
                        .as_u64()
                        .map(Felt::from)
                        .ok_or_else(|| WalletError::provider(502, "invalid paymaster data")),
                    _ => Err(WalletError::provider(502, "invalid paymaster data")),
                })
                .collect::<WalletResult<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    let tip = match response.pointer("/tip") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => parse_felt(s)
            .ok()
            .and_then(|f| u64::try_from(f).ok())
            .unwrap_or(0),
        _ => 0,
    };

    Ok(SponsorApproval { paymaster_data, tip })
}

#[async_trait]
impl Sponsor for SponsorClient {
    async fn request_sponsorship(&self, sender: Felt, calls: &[Call]) -> WalletResult<SponsorApproval> {
        info!(sender = %felt_hex(&sender), calls = calls.len(), "Requesting paymaster sponsorship");

        let response = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&sponsor_body(&self.chain_id_name, sender, calls))
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WalletError::NetworkError(format!("failed to read sponsor response: {e}")))?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(body);
            return Err(WalletError::provider(status.as_u16(), message));
        }

        let body: Value = serde_json::from_str(&body)
            .map_err(|e| WalletError::provider(502, format!("invalid sponsor response: {e}")))?;
        let approval = parse_approval(&body)?;
        info!("Paymaster approved sponsorship");
        Ok(approval)
    }
}
