// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use serde::{Deserialize, Serialize};
use starknet::core::{chain_id, types::Felt, utils::get_selector_from_name};
use utoipa::ToSchema;

use crate::error::{WalletError, WalletResult};

/// Starknet network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID as used in transaction hashes
    pub chain_id: Felt,
    /// Chain ID short string (`SN_MAIN`, `SN_SEPOLIA`)
    pub chain_id_name: &'static str,
    /// Block explorer URL
    pub explorer_url: &'static str,
}

/// Starknet Mainnet configuration.
pub const STARKNET_MAINNET: NetworkConfig = NetworkConfig {
    name: "Starknet Mainnet",
    chain_id: chain_id::MAINNET,
    chain_id_name: "SN_MAIN",
    explorer_url: "https://voyager.online",
};

/// Starknet Sepolia testnet configuration.
pub const STARKNET_SEPOLIA: NetworkConfig = NetworkConfig {
    name: "Starknet Sepolia",
    chain_id: chain_id::SEPOLIA,
    chain_id_name: "SN_SEPOLIA",
    explorer_url: "https://sepolia.voyager.online",
};

pub const NETWORK_SEPOLIA: &str = "sepolia";
pub const NETWORK_MAINNET: &str = "mainnet";

/// Resolve a network name (`sepolia` when absent).
pub fn network_from_name(raw: Option<&str>) -> WalletResult<NetworkConfig> {
    let value = raw.unwrap_or(NETWORK_SEPOLIA).trim().to_ascii_lowercase();
    match value.as_str() {
        NETWORK_SEPOLIA => Ok(STARKNET_SEPOLIA),
        NETWORK_MAINNET => Ok(STARKNET_MAINNET),
        other => Err(WalletError::InvalidArgument(format!(
            "Unsupported network `{other}` (expected `{NETWORK_SEPOLIA}` or `{NETWORK_MAINNET}`)"
        ))),
    }
}

/// EARN token decimals.
pub const EARN_DECIMALS: u8 = 18;
pub const EARN_SYMBOL: &str = "EARN";

/// A single contract invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Contract being invoked
    pub contract_address: Felt,
    /// Entry point name, hashed into the selector on submission
    pub entrypoint: String,
    /// Serialized arguments
    pub calldata: Vec<Felt>,
}

impl Call {
    pub fn new(contract_address: Felt, entrypoint: impl Into<String>, calldata: Vec<Felt>) -> Self {
        Self {
            contract_address,
            entrypoint: entrypoint.into(),
            calldata,
        }
    }

    /// Entry point selector (`sn_keccak` of the name).
    pub fn selector(&self) -> WalletResult<Felt> {
        get_selector_from_name(&self.entrypoint).map_err(|_| {
            WalletError::InvalidArgument(format!("Invalid entrypoint name: {}", self.entrypoint))
        })
    }

    /// Selector-resolved form used by starknet-rs accounts.
    pub fn to_starknet_call(&self) -> WalletResult<starknet::core::types::Call> {
        Ok(starknet::core::types::Call {
            to: self.contract_address,
            selector: self.selector()?,
            calldata: self.calldata.clone(),
        })
    }
}

/// Call as supplied by API callers (hex or decimal strings).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub contract_address: String,
    pub entrypoint: String,
    #[serde(default)]
    pub calldata: Vec<String>,
}

impl CallRequest {
    pub fn to_call(&self) -> WalletResult<Call> {
        let contract_address = parse_felt(&self.contract_address)?;
        if self.entrypoint.trim().is_empty() {
            return Err(WalletError::InvalidArgument("entrypoint is required".into()));
        }
        let calldata = self
            .calldata
            .iter()
            .map(|value| parse_felt(value))
            .collect::<WalletResult<Vec<_>>>()?;
        Ok(Call::new(contract_address, self.entrypoint.trim(), calldata))
    }
}

/// One call or an ordered list of calls.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum CallBatch {
    Many(Vec<CallRequest>),
    One(CallRequest),
}

impl CallBatch {
    /// Normalise to an ordered, non-empty list. Order is preserved and
    /// duplicates are kept.
    pub fn into_calls(self) -> WalletResult<Vec<Call>> {
        let requests = match self {
            CallBatch::One(call) => vec![call],
            CallBatch::Many(calls) => calls,
        };
        if requests.is_empty() {
            return Err(WalletError::InvalidArgument(
                "at least one call is required".into(),
            ));
        }
        requests.iter().map(CallRequest::to_call).collect()
    }
}

/// Token balance information.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenBalance {
    /// Token symbol (e.g., "EARN")
    pub symbol: String,
    /// Balance in smallest unit
    pub balance_raw: String,
    /// Balance formatted with decimals
    pub balance_formatted: String,
    /// Number of decimals
    pub decimals: u8,
    /// Token contract address
    pub contract_address: String,
}

/// On-chain state of an account address.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    /// Account address (hex)
    pub address: String,
    /// Whether a contract exists at the address
    pub is_deployed: bool,
    /// Current nonce, only for deployed accounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Deployed class hash, only for deployed accounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_hash: Option<String>,
}

/// Result of a submitted transaction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTransaction {
    /// Hash returned by the node or the paymaster
    pub transaction_hash: String,
    /// Account address the transaction was sent for
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Parse a felt from a `0x`-prefixed hex or a decimal string.
pub fn parse_felt(raw: &str) -> WalletResult<Felt> {
    let value = raw.trim();
    let parsed = if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            None
        } else {
            Felt::from_hex(value).ok()
        }
    } else if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        Felt::from_dec_str(value).ok()
    } else {
        None
    };
    parsed.ok_or_else(|| WalletError::InvalidArgument(format!("Invalid felt value: {raw}")))
}

/// Minimal lowercase hex (`0x0` for zero).
pub fn felt_hex(value: &Felt) -> String {
    format!("{value:#x}")
}

/// 64-digit zero-padded lowercase hex.
pub fn felt_fixed_hex(value: &Felt) -> String {
    format!("{value:#064x}")
}

/// Parse a hex quantity as returned by RPC endpoints (`"0x1a"`).
pub fn parse_hex_u128(raw: &str) -> WalletResult<u128> {
    let felt = parse_felt(raw)?;
    u128::try_from(felt)
        .map_err(|_| WalletError::InvalidArgument(format!("Quantity exceeds u128: {raw}")))
}

/// Cairo `u256` as `[low, high]` calldata.
pub fn u256_calldata(amount: u128) -> [Felt; 2] {
    [Felt::from(amount), Felt::ZERO]
}

/// Decode a Cairo `u256` returned as `[low, high]`.
pub fn u256_from_words(words: &[Felt]) -> WalletResult<u128> {
    let low = words
        .first()
        .ok_or_else(|| WalletError::InvalidArgument("empty u256 result".into()))?;
    let high = words.get(1).copied().unwrap_or(Felt::ZERO);
    if high != Felt::ZERO {
        return Err(WalletError::InvalidArgument(
            "u256 value exceeds supported range".into(),
        ));
    }
    u128::try_from(*low)
        .map_err(|_| WalletError::InvalidArgument("u256 low word exceeds 128 bits".into()))
}
