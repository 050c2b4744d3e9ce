// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Starknet client for account state, balances and confirmations.

use std::sync::Arc;
use std::time::Duration;

use starknet::core::types::{ExecutionResult, Felt};
use tracing::{debug, info, warn};

use super::erc20::{format_amount, Erc20Contract, EarnManager};
use super::rpc::{ChainProvider, TransactionOutcome};
use super::types::*;
use crate::error::{WalletError, WalletResult};

/// Default confirmation timeout.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);
/// Default delay between receipt polls.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
/// Delay before the second lookup of an account that was not found.
pub const ACCOUNT_INFO_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub retry_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_WAIT_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Starknet client.
#[derive(Clone)]
pub struct StarknetClient {
    /// Network configuration
    network: NetworkConfig,
    provider: Arc<dyn ChainProvider>,
    earn_token: Erc20Contract,
    manager: Option<EarnManager>,
}

impl StarknetClient {
    pub fn new(
        network: NetworkConfig,
        provider: Arc<dyn ChainProvider>,
        earn_token: Felt,
        manager: Option<Felt>,
    ) -> Self {
        Self {
            network,
            provider,
            earn_token: Erc20Contract::new(earn_token),
            manager: manager.map(EarnManager::new),
        }
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn provider(&self) -> &dyn ChainProvider {
        self.provider.as_ref()
    }

    pub fn shared_provider(&self) -> Arc<dyn ChainProvider> {
        Arc::clone(&self.provider)
    }

    pub fn earn_token(&self) -> Erc20Contract {
        self.earn_token
    }

    pub fn manager(&self) -> Option<EarnManager> {
        self.manager
    }

    /// Whether a contract exists at `address`. Network failures propagate.
    pub async fn is_deployed(&self, address: Felt) -> WalletResult<bool> {
        match self.provider.get_class_hash_at(address).await {
            Ok(class_hash) => Ok(class_hash != Felt::ZERO),
            Err(WalletError::NotDeployed(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// On-chain state of `address`. With `retry`, an address that is not
    /// deployed yet is looked up once more after [`ACCOUNT_INFO_RETRY_DELAY`],
    /// for callers that just submitted its deployment.
    pub async fn account_info(&self, address: Felt, retry: bool) -> WalletResult<AccountInfo> {
        let info = self.query_account(address).await?;
        if info.is_deployed || !retry {
            return Ok(info);
        }
        debug!(address = %felt_hex(&address), "Account not found; retrying once");
        tokio::time::sleep(ACCOUNT_INFO_RETRY_DELAY).await;
        self.query_account(address).await
    }

    async fn query_account(&self, address: Felt) -> WalletResult<AccountInfo> {
        let class_hash = match self.provider.get_class_hash_at(address).await {
            Ok(hash) if hash != Felt::ZERO => hash,
            Ok(_) | Err(WalletError::NotDeployed(_)) => {
                return Ok(AccountInfo {
                    address: felt_hex(&address),
                    is_deployed: false,
                    nonce: None,
                    class_hash: None,
                })
            }
            Err(e) => return Err(e),
        };
        let nonce = self.provider.get_nonce(address).await?;
        Ok(AccountInfo {
            address: felt_hex(&address),
            is_deployed: true,
            nonce: Some(felt_hex(&nonce)),
            class_hash: Some(felt_hex(&class_hash)),
        })
    }

    /// Raw EARN balance; failures propagate.
    pub async fn earn_balance_raw(&self, address: Felt) -> WalletResult<u128> {
        self.earn_token.balance_of(self.provider.as_ref(), address).await
    }

    /// EARN balance for display. Any failure reads as `0`, which is what a
    /// counterfactual address reports.
    pub async fn earn_balance(&self, address: Felt) -> TokenBalance {
        let raw = match self.earn_balance_raw(address).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(address = %felt_hex(&address), error = %e, "EARN balance lookup failed; reporting 0");
                0
            }
        };
        TokenBalance {
            symbol: EARN_SYMBOL.to_string(),
            balance_raw: raw.to_string(),
            balance_formatted: format_amount(raw, EARN_DECIMALS),
            decimals: EARN_DECIMALS,
            contract_address: felt_hex(&self.earn_token.address()),
        }
    }

    /// EARN held by the reward manager.
    pub async fn manager_balance(&self) -> WalletResult<u128> {
        let manager = self
            .manager
            .ok_or_else(|| WalletError::MissingConfig("EARN_MANAGER_ADDRESS".into()))?;
        manager.get_earns_balance(self.provider.as_ref()).await
    }

    /// Poll for a receipt until the transaction succeeds, reverts or the
    /// timeout expires.
    pub async fn wait_for_transaction(
        &self,
        hash: Felt,
        options: WaitOptions,
    ) -> WalletResult<TransactionOutcome> {
        let deadline = tokio::time::Instant::now() + options.timeout;
        loop {
            if let Some(outcome) = self.provider.get_transaction_receipt(hash).await? {
                return match &outcome.execution {
                    ExecutionResult::Succeeded => {
                        info!(
                            transaction_hash = %felt_hex(&hash),
                            finality = ?outcome.finality,
                            "Transaction confirmed"
                        );
                        Ok(outcome)
                    }
                    ExecutionResult::Reverted { reason } => {
                        Err(WalletError::ChainRejected(reason.clone()))
                    }
                };
            }
            if tokio::time::Instant::now() + options.retry_interval > deadline {
                return Err(WalletError::Timeout(format!(
                    "transaction {} not confirmed within {}s",
                    felt_hex(&hash),
                    options.timeout.as_secs()
                )));
            }
            debug!(transaction_hash = %felt_hex(&hash), "Receipt not available yet");
            tokio::time::sleep(options.retry_interval).await;
        }
    }
}
