// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fee-mode negotiation with the paymaster.
//!
//! A negotiation resolves exactly one [`FeeMode`] for a transaction:
//! sponsored (the paymaster pays) or self-paid in a gas token the paymaster
//! accepts. Self-paid estimates carry a 1.5x safety margin.

use std::sync::Arc;

use starknet::core::types::Felt;
use tracing::{info, warn};

use super::rpc::{DeploymentData, PaymasterRpc, PaymasterTransaction};
use crate::blockchain::types::{felt_hex, Call};
use crate::error::{WalletError, WalletResult};

/// Configured paymaster mode (`PAYMASTER_MODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymasterMode {
    #[default]
    Sponsored,
    /// `default` in paymaster terms: the account pays in a gas token.
    SelfPaid,
}

impl PaymasterMode {
    pub fn parse(raw: Option<&str>) -> WalletResult<Self> {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("sponsored") => Ok(PaymasterMode::Sponsored),
            Some("default") => Ok(PaymasterMode::SelfPaid),
            Some(other) => Err(WalletError::InvalidArgument(format!(
                "Unsupported paymaster mode `{other}` (expected `sponsored` or `default`)"
            ))),
        }
    }
}

/// Fee mode for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeMode {
    Sponsored,
    SelfPaid { gas_token: Felt },
}

impl FeeMode {
    pub fn is_sponsored(&self) -> bool {
        matches!(self, FeeMode::Sponsored)
    }

    pub fn gas_token(&self) -> Option<Felt> {
        match self {
            FeeMode::Sponsored => None,
            FeeMode::SelfPaid { gas_token } => Some(*gas_token),
        }
    }
}

/// `ceil(1.5 * fee)` in integer arithmetic: `(fee * 3 + 1) / 2`.
///
/// Quantities come from upstream estimates; one too large for the margin
/// is a provider error rather than a silently clamped bound.
pub fn apply_safety_margin(fee: u128) -> WalletResult<u128> {
    fee.checked_mul(3)
        .and_then(|tripled| tripled.checked_add(1))
        .map(|raised| raised / 2)
        .ok_or_else(|| {
            WalletError::provider(502, format!("fee quantity {fee} overflows the safety margin"))
        })
}

/// What a caller wants executed, with the fee mode already fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionIntent {
    pub calls: Vec<Call>,
    pub fee_mode: FeeMode,
    pub deployment: Option<DeploymentData>,
}

impl TransactionIntent {
    pub fn new(calls: Vec<Call>, fee_mode: FeeMode, deployment: Option<DeploymentData>) -> Self {
        Self {
            calls,
            fee_mode,
            deployment,
        }
    }

    /// Paymaster transaction for `user_address`.
    pub fn to_paymaster_transaction(&self, user_address: Felt) -> WalletResult<PaymasterTransaction> {
        match (&self.deployment, self.calls.is_empty()) {
            (Some(deployment), true) => Ok(PaymasterTransaction::Deploy(deployment.clone())),
            (Some(deployment), false) => Ok(PaymasterTransaction::DeployAndInvoke {
                deployment: deployment.clone(),
                user_address,
                calls: self.calls.clone(),
            }),
            (None, false) => Ok(PaymasterTransaction::Invoke {
                user_address,
                calls: self.calls.clone(),
            }),
            (None, true) => Err(WalletError::InvalidArgument(
                "transaction has neither calls nor a deployment".into(),
            )),
        }
    }
}

/// Resolves fee modes and self-paid fee estimates.
#[derive(Clone)]
pub struct PaymasterNegotiator {
    rpc: Arc<dyn PaymasterRpc>,
    mode: PaymasterMode,
    configured_gas_token: Option<Felt>,
}

impl PaymasterNegotiator {
    pub fn new(rpc: Arc<dyn PaymasterRpc>, mode: PaymasterMode, configured_gas_token: Option<Felt>) -> Self {
        Self {
            rpc,
            mode,
            configured_gas_token,
        }
    }

    pub fn rpc(&self) -> &Arc<dyn PaymasterRpc> {
        &self.rpc
    }

    pub fn mode(&self) -> PaymasterMode {
        self.mode
    }

    /// Decide the fee mode. Availability problems are logged and ignored.
    pub async fn negotiate(&self) -> WalletResult<FeeMode> {
        match self.rpc.is_available().await {
            Ok(true) => {}
            Ok(false) => warn!("Paymaster reports it is not available; continuing"),
            Err(e) => warn!(error = %e, "Paymaster availability check failed; continuing"),
        }

        let fee_mode = match self.mode {
            PaymasterMode::Sponsored => FeeMode::Sponsored,
            PaymasterMode::SelfPaid => FeeMode::SelfPaid {
                gas_token: self.select_gas_token().await?,
            },
        };
        info!(
            sponsored = fee_mode.is_sponsored(),
            gas_token = fee_mode.gas_token().map(|t| felt_hex(&t)).unwrap_or_default(),
            "Paymaster fee mode negotiated"
        );
        Ok(fee_mode)
    }

    async fn select_gas_token(&self) -> WalletResult<Felt> {
        match self.rpc.get_supported_tokens().await {
            Ok(tokens) => match self.configured_gas_token {
                Some(configured) => {
                    if !tokens.iter().any(|t| t.token_address == configured) {
                        warn!(
                            gas_token = %felt_hex(&configured),
                            "Configured gas token is not listed as supported; using it anyway"
                        );
                    }
                    Ok(configured)
                }
                None => tokens
                    .first()
                    .map(|t| t.token_address)
                    .ok_or(WalletError::NoSupportedGasToken),
            },
            Err(e) => {
                warn!(error = %e, "Could not fetch supported gas tokens");
                self.configured_gas_token
                    .ok_or(WalletError::NoSupportedGasToken)
            }
        }
    }

    /// Maximum fee for a self-paid transaction, `None` when sponsored.
    ///
    /// Issues one build request in self-paid mode and none when sponsored.
    pub async fn estimate_fee(
        &self,
        transaction: &PaymasterTransaction,
        fee_mode: &FeeMode,
    ) -> WalletResult<Option<u128>> {
        if fee_mode.is_sponsored() {
            return Ok(None);
        }
        let quote = self.rpc.estimate_fee(transaction, fee_mode).await?;
        let max_fee = apply_safety_margin(quote.suggested_max_fee_in_gas_token)?;
        info!(
            suggested = quote.suggested_max_fee_in_gas_token,
            max_fee, "Paymaster fee estimated"
        );
        Ok(Some(max_fee))
    }
}
