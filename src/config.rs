// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values and
//! loads them into a [`WalletConfig`]. Configuration is read once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `PRIVY_APP_ID` | Privy application id | Required |
//! | `PRIVY_APP_SECRET` | Privy application secret | Required |
//! | `PRIVY_API_BASE_URL` | Privy REST API base | `https://api.privy.io` |
//! | `PRIVY_JWKS_URL` | JWKS endpoint for credential verification | Derived from app id |
//! | `PRIVY_WALLET_AUTH_PRIVATE_KEY` | Authorization key for request signatures | Optional |
//! | `RPC_URL` | Starknet JSON-RPC endpoint | Required |
//! | `STARKNET_NETWORK` | `sepolia` or `mainnet` | `sepolia` |
//! | `ACCOUNT_CLASS_HASH` | Account contract class hash | Required |
//! | `EARN_TOKEN_ADDRESS` | EARN ERC-20 contract | Required |
//! | `EARN_MANAGER_ADDRESS` | Reward manager contract | Optional |
//! | `OPERATOR_ADDRESS` | Operator account for reward transfers | Optional |
//! | `OPERATOR_PRIVATE_KEY` | Operator signing key | Optional |
//! | `PAYMASTER_URL` | SNIP-29 paymaster endpoint | `https://sepolia.paymaster.avnu.fi` |
//! | `PAYMASTER_MODE` | `sponsored` or `default` (self-paid) | `sponsored` |
//! | `PAYMASTER_API_KEY` | Paymaster API key | Required when sponsored |
//! | `GAS_TOKEN_ADDRESS` | Preferred gas token for self-paid fees | `EARN_TOKEN_ADDRESS` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::fmt;

use starknet::core::types::Felt;

use crate::blockchain::types::{network_from_name, parse_felt, NetworkConfig};
use crate::error::{WalletError, WalletResult};
use crate::paymaster::PaymasterMode;

pub const PRIVY_APP_ID_ENV: &str = "PRIVY_APP_ID";
pub const PRIVY_APP_SECRET_ENV: &str = "PRIVY_APP_SECRET";
pub const PRIVY_API_BASE_URL_ENV: &str = "PRIVY_API_BASE_URL";
pub const PRIVY_JWKS_URL_ENV: &str = "PRIVY_JWKS_URL";
pub const PRIVY_WALLET_AUTH_PRIVATE_KEY_ENV: &str = "PRIVY_WALLET_AUTH_PRIVATE_KEY";
pub const RPC_URL_ENV: &str = "RPC_URL";
pub const STARKNET_NETWORK_ENV: &str = "STARKNET_NETWORK";
pub const ACCOUNT_CLASS_HASH_ENV: &str = "ACCOUNT_CLASS_HASH";
pub const EARN_TOKEN_ADDRESS_ENV: &str = "EARN_TOKEN_ADDRESS";
pub const EARN_MANAGER_ADDRESS_ENV: &str = "EARN_MANAGER_ADDRESS";
pub const OPERATOR_ADDRESS_ENV: &str = "OPERATOR_ADDRESS";
pub const OPERATOR_PRIVATE_KEY_ENV: &str = "OPERATOR_PRIVATE_KEY";
pub const PAYMASTER_URL_ENV: &str = "PAYMASTER_URL";
pub const PAYMASTER_MODE_ENV: &str = "PAYMASTER_MODE";
pub const PAYMASTER_API_KEY_ENV: &str = "PAYMASTER_API_KEY";
pub const GAS_TOKEN_ADDRESS_ENV: &str = "GAS_TOKEN_ADDRESS";

/// Log output format (`LOG_FORMAT`).
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_PRIVY_API_BASE_URL: &str = "https://api.privy.io";
pub const DEFAULT_PAYMASTER_URL: &str = "https://sepolia.paymaster.avnu.fi";

/// Privy JWKS endpoint for an application.
pub fn default_privy_jwks_url(app_id: &str) -> String {
    format!("https://auth.privy.io/api/v1/apps/{app_id}/jwks.json")
}

/// String that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrivyConfig {
    pub app_id: String,
    pub app_secret: Secret,
    pub api_base_url: String,
    pub jwks_url: String,
    pub wallet_auth_private_key: Option<Secret>,
}

#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub address: Felt,
    pub private_key: Secret,
    pub manager_address: Felt,
}

#[derive(Debug, Clone)]
pub struct StarknetConfig {
    pub rpc_url: String,
    pub network: NetworkConfig,
    pub account_class_hash: Felt,
    pub earn_token_address: Felt,
    pub earn_manager_address: Option<Felt>,
    pub operator: Option<OperatorConfig>,
}

#[derive(Debug, Clone)]
pub struct PaymasterConfig {
    pub url: String,
    pub mode: PaymasterMode,
    pub api_key: Option<Secret>,
    /// Preferred gas token for self-paid fees.
    pub gas_token: Felt,
}

/// Complete wallet core configuration.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub privy: PrivyConfig,
    pub starknet: StarknetConfig,
    pub paymaster: PaymasterConfig,
    pub log_format: LogFormat,
}

impl WalletConfig {
    /// Load from process environment.
    pub fn from_env() -> WalletResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> WalletResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let app_id = env.required(PRIVY_APP_ID_ENV)?;
        let privy = PrivyConfig {
            app_secret: Secret::new(env.required(PRIVY_APP_SECRET_ENV)?),
            api_base_url: env
                .or_default(PRIVY_API_BASE_URL_ENV, DEFAULT_PRIVY_API_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            jwks_url: env
                .optional(PRIVY_JWKS_URL_ENV)
                .unwrap_or_else(|| default_privy_jwks_url(&app_id)),
            wallet_auth_private_key: env.optional(PRIVY_WALLET_AUTH_PRIVATE_KEY_ENV).map(Secret::new),
            app_id,
        };

        let rpc_url = env.required(RPC_URL_ENV)?;
        url::Url::parse(&rpc_url)
            .map_err(|e| WalletError::InvalidArgument(format!("{RPC_URL_ENV}: {e}")))?;

        let network = network_from_name(env.optional(STARKNET_NETWORK_ENV).as_deref())?;
        let account_class_hash = env.felt(ACCOUNT_CLASS_HASH_ENV)?;
        let earn_token_address = env.felt(EARN_TOKEN_ADDRESS_ENV)?;
        let earn_manager_address = env.optional_felt(EARN_MANAGER_ADDRESS_ENV)?;

        let operator = match (
            env.optional_felt(OPERATOR_ADDRESS_ENV)?,
            env.optional(OPERATOR_PRIVATE_KEY_ENV),
            earn_manager_address,
        ) {
            (Some(address), Some(private_key), Some(manager_address)) => Some(OperatorConfig {
                address,
                private_key: Secret::new(private_key),
                manager_address,
            }),
            _ => None,
        };

        let mode = PaymasterMode::parse(env.optional(PAYMASTER_MODE_ENV).as_deref())?;
        let paymaster = PaymasterConfig {
            url: env
                .or_default(PAYMASTER_URL_ENV, DEFAULT_PAYMASTER_URL)
                .trim_end_matches('/')
                .to_string(),
            mode,
            api_key: env.optional(PAYMASTER_API_KEY_ENV).map(Secret::new),
            gas_token: env
                .optional_felt(GAS_TOKEN_ADDRESS_ENV)?
                .unwrap_or(earn_token_address),
        };
        if paymaster.mode == PaymasterMode::Sponsored && paymaster.api_key.is_none() {
            return Err(WalletError::MissingConfig(format!(
                "{PAYMASTER_API_KEY_ENV} (required for sponsored mode)"
            )));
        }

        Ok(Self {
            privy,
            starknet: StarknetConfig {
                rpc_url,
                network,
                account_class_hash,
                earn_token_address,
                earn_manager_address,
                operator,
            },
            paymaster,
            log_format: LogFormat::parse(env.optional(LOG_FORMAT_ENV).as_deref()),
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> WalletResult<String> {
        self.optional(name)
            .ok_or_else(|| WalletError::MissingConfig(name.to_string()))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn felt(&self, name: &str) -> WalletResult<Felt> {
        let raw = self.required(name)?;
        parse_felt(&raw).map_err(|_| WalletError::InvalidArgument(format!("{name}: {raw}")))
    }

    fn optional_felt(&self, name: &str) -> WalletResult<Option<Felt>> {
        self.optional(name)
            .map(|raw| {
                parse_felt(&raw).map_err(|_| WalletError::InvalidArgument(format!("{name}: {raw}")))
            })
            .transpose()
    }
}
