// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet use cases.
//!
//! Every operation authenticates the bearer credential first, resolves the
//! custody wallet and then applies the domain pre-checks before anything is
//! signed or submitted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use starknet::core::types::Felt;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;
use crate::blockchain::account::{AccountIdentity, DeploymentContext, StarknetAccount};
use crate::blockchain::address::predict_address_for_user;
use crate::blockchain::client::{StarknetClient, WaitOptions};
use crate::blockchain::erc20::{format_amount, parse_amount};
use crate::blockchain::types::{
    felt_hex, parse_felt, Call, CallBatch, SubmittedTransaction, TokenBalance, EARN_DECIMALS,
    EARN_SYMBOL,
};
use crate::builder::{AccountBuilder, BuildOptions};
use crate::config::{Secret, WalletConfig};
use crate::error::{WalletError, WalletResult};
use crate::orchestrator::{OperationStage, OperatorTransfers, Orchestrator};
use crate::paymaster::{PaymasterNegotiator, PaymasterRpc};
use crate::privy::client::{IdentityProvider, PrivyClient, ProviderWallet, STARKNET_CHAIN_TYPE};
use crate::privy::AuthorizationKeyCache;
use crate::state::CoreState;

/// A custody wallet that is usable as a Starknet account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarknetWallet {
    pub identity: AccountIdentity,
    /// Address reported by the custody service.
    pub address: Felt,
}

impl StarknetWallet {
    pub fn from_provider(wallet: &ProviderWallet, class_hash: Felt) -> WalletResult<Self> {
        if wallet.chain_type != STARKNET_CHAIN_TYPE {
            return Err(WalletError::InvalidArgument(
                "Provided wallet is not a Starknet wallet".into(),
            ));
        }
        let public_key = wallet
            .public_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| WalletError::InvalidArgument("Wallet missing Starknet public key".into()))?;
        if wallet.address.trim().is_empty() {
            return Err(WalletError::InvalidArgument("Wallet missing address".into()));
        }
        Ok(Self {
            identity: AccountIdentity::new(wallet.id.clone(), parse_felt(public_key)?, class_hash),
            address: parse_felt(&wallet.address)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletSummary {
    pub wallet_id: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    pub chain_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl From<ProviderWallet> for WalletSummary {
    fn from(wallet: ProviderWallet) -> Self {
        Self {
            wallet_id: wallet.id,
            address: wallet.address,
            public_key: wallet.public_key,
            chain_type: wallet.chain_type,
            created_at: wallet.created_at,
        }
    }
}

/// Wallet with its on-chain state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletDetail {
    pub wallet_id: String,
    pub address: String,
    pub public_key: String,
    pub is_deployed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_hash: Option<String>,
    pub balance: TokenBalance,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub wallet_id: String,
    pub address: String,
    pub balance: TokenBalance,
}

/// Caller-facing wallet operations.
pub struct WalletService {
    identity: Arc<dyn IdentityProvider>,
    chain: StarknetClient,
    builder: AccountBuilder,
    orchestrator: Orchestrator,
    use_paymaster: bool,
    operator: Option<OperatorTransfers>,
    class_hash: Felt,
    authorization_keys: Arc<AuthorizationKeyCache>,
    /// App-level authorization key used when no user signer can be issued.
    fallback_authorization_key: Option<Secret>,
    wait: WaitOptions,
}

impl WalletService {
    pub fn new(identity: Arc<dyn IdentityProvider>, chain: StarknetClient, class_hash: Felt) -> Self {
        let builder = AccountBuilder::new(Arc::clone(&identity), chain.network().chain_id);
        let orchestrator = Orchestrator::new(chain.shared_provider());
        Self {
            identity,
            chain,
            builder,
            orchestrator,
            use_paymaster: false,
            operator: None,
            class_hash,
            authorization_keys: Arc::new(AuthorizationKeyCache::default()),
            fallback_authorization_key: None,
            wait: WaitOptions::default(),
        }
    }

    /// Route deployments and executions through the paymaster.
    pub fn with_paymaster(mut self, negotiator: PaymasterNegotiator) -> Self {
        self.builder = self.builder.with_paymaster(negotiator);
        self.use_paymaster = true;
        self
    }

    pub fn with_operator(mut self, operator: OperatorTransfers) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn with_authorization_keys(
        mut self,
        cache: Arc<AuthorizationKeyCache>,
        fallback: Option<Secret>,
    ) -> Self {
        self.authorization_keys = cache;
        self.fallback_authorization_key = fallback;
        self
    }

    pub fn with_wait_options(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Production wiring: Privy, the JSON-RPC node and the SNIP-29
    /// paymaster, sharing the process-wide caches in `state`.
    pub fn from_config(config: &WalletConfig, state: &CoreState) -> WalletResult<Self> {
        let provider = state.chain_provider(config)?;
        let chain = StarknetClient::new(
            config.starknet.network.clone(),
            provider,
            config.starknet.earn_token_address,
            config.starknet.earn_manager_address,
        );
        let identity = Arc::new(PrivyClient::new(config.privy.clone())?);
        let paymaster: Arc<dyn PaymasterRpc> = state.paymaster(config)?;
        let negotiator = PaymasterNegotiator::new(
            paymaster,
            config.paymaster.mode,
            Some(config.paymaster.gas_token),
        );

        let mut service = Self::new(identity, chain, config.starknet.account_class_hash)
            .with_paymaster(negotiator)
            .with_authorization_keys(
                Arc::clone(&state.authorization_keys),
                config.privy.wallet_auth_private_key.clone(),
            );
        if let Some(operator) = &config.starknet.operator {
            let transfers = OperatorTransfers::from_config(
                operator,
                &config.paymaster,
                &config.starknet.network,
                service.chain.shared_provider(),
            )?;
            service = service.with_operator(transfers);
        }
        info!(
            network = config.starknet.network.name,
            paymaster_mode = ?config.paymaster.mode,
            operator = service.operator.is_some(),
            "Wallet service configured"
        );
        Ok(service)
    }

    pub fn chain(&self) -> &StarknetClient {
        &self.chain
    }

    pub async fn authenticate(&self, credential: &str) -> WalletResult<AuthenticatedUser> {
        self.identity.verify_credential(credential).await
    }

    /// Counterfactual address a user id maps to.
    pub fn address_for_user(&self, user_id: &str) -> WalletResult<Felt> {
        predict_address_for_user(user_id, self.class_hash)
    }

    async fn starknet_wallet(&self, wallet_id: &str) -> WalletResult<StarknetWallet> {
        if wallet_id.trim().is_empty() {
            return Err(WalletError::InvalidArgument("walletId is required".into()));
        }
        let wallet = self.identity.get_wallet(wallet_id).await?;
        StarknetWallet::from_provider(&wallet, self.class_hash)
    }

    async fn authorization_key(&self, credential: &str, user_id: &str) -> WalletResult<String> {
        match self
            .authorization_keys
            .get_user_authorization_key(self.identity.as_ref(), credential, user_id)
            .await
        {
            Ok(key) => Ok(key),
            Err(e) => match &self.fallback_authorization_key {
                Some(key) => {
                    warn!(user_id, error = %e, "User signer unavailable; using app authorization key");
                    Ok(key.expose().to_string())
                }
                None => Err(e),
            },
        }
    }

    async fn account(
        &self,
        user: &AuthenticatedUser,
        credential: &str,
        wallet: &StarknetWallet,
    ) -> WalletResult<StarknetAccount> {
        let authorization_key = self.authorization_key(credential, &user.user_id).await?;
        let options = BuildOptions {
            use_paymaster: self.use_paymaster,
            known_address: Some(wallet.address),
            authorization_key: Some(authorization_key),
        };
        self.builder.build(&wallet.identity, credential, options)
    }

    async fn require_deployed(&self, address: Felt) -> WalletResult<()> {
        if !self.chain.is_deployed(address).await? {
            return Err(WalletError::NotDeployed(format!(
                "{} (deploy the account first)",
                felt_hex(&address)
            )));
        }
        Ok(())
    }

    pub async fn create_wallet(&self, credential: &str) -> WalletResult<WalletSummary> {
        let user = self.authenticate(credential).await?;
        info!(user_id = %user.user_id, "Creating Starknet wallet");

        let wallet = self.identity.create_wallet(&user.user_id).await?;
        StarknetWallet::from_provider(&wallet, self.class_hash)?;
        info!(wallet_id = %wallet.id, address = %wallet.address, "Starknet wallet created");
        Ok(wallet.into())
    }

    /// The user's Starknet wallets. Wallets on other chains or without an
    /// address are skipped.
    pub async fn list_wallets(&self, credential: &str) -> WalletResult<Vec<WalletSummary>> {
        let user = self.authenticate(credential).await?;
        let wallets = self.identity.list_wallets(&user.user_id).await?;
        Ok(wallets
            .into_iter()
            .filter(|w| w.chain_type == STARKNET_CHAIN_TYPE && !w.address.trim().is_empty())
            .map(WalletSummary::from)
            .collect())
    }

    pub async fn wallet_detail(&self, credential: &str, wallet_id: &str) -> WalletResult<WalletDetail> {
        self.authenticate(credential).await?;
        let wallet = self.starknet_wallet(wallet_id).await?;

        let account = self.chain.account_info(wallet.address, false).await?;
        let balance = self.chain.earn_balance(wallet.address).await;
        Ok(WalletDetail {
            wallet_id: wallet.identity.wallet_id,
            address: account.address,
            public_key: felt_hex(&wallet.identity.public_key),
            is_deployed: account.is_deployed,
            nonce: account.nonce,
            class_hash: account.class_hash,
            balance,
        })
    }

    pub async fn balance(&self, credential: &str, wallet_id: &str) -> WalletResult<WalletBalance> {
        self.authenticate(credential).await?;
        let wallet = self.starknet_wallet(wallet_id).await?;
        Ok(WalletBalance {
            wallet_id: wallet.identity.wallet_id,
            address: felt_hex(&wallet.address),
            balance: self.chain.earn_balance(wallet.address).await,
        })
    }

    /// Deploy the wallet's account contract.
    pub async fn deploy(&self, credential: &str, wallet_id: &str) -> WalletResult<SubmittedTransaction> {
        let user = self.authenticate(credential).await?;
        let wallet = self.starknet_wallet(wallet_id).await?;
        info!(wallet_id, address = %felt_hex(&wallet.address), "Deploying Starknet account");

        if self.chain.is_deployed(wallet.address).await? {
            return Err(WalletError::AlreadyDeployed(felt_hex(&wallet.address)));
        }

        let account = self.account(&user, credential, &wallet).await?;
        let context = DeploymentContext::resolve(&wallet.identity, Some(wallet.address))?;
        let outcome = if self.use_paymaster {
            self.orchestrator.deploy_with_paymaster(&account, &context).await?
        } else {
            self.orchestrator.deploy_self_sponsored(&account, &context).await?
        };
        Ok(outcome.into())
    }

    /// Send EARN rewards from the operator to the wallet. The account does
    /// not have to be deployed.
    pub async fn claim(
        &self,
        credential: &str,
        wallet_id: &str,
        amount: &str,
    ) -> WalletResult<SubmittedTransaction> {
        self.authenticate(credential).await?;
        let amount = parse_amount(amount, EARN_DECIMALS)?;
        if amount == 0 {
            return Err(WalletError::InvalidArgument(
                "Invalid amount. Must be greater than 0".into(),
            ));
        }
        let operator = self.operator.as_ref().ok_or_else(|| {
            WalletError::MissingConfig(
                "OPERATOR_ADDRESS, OPERATOR_PRIVATE_KEY and EARN_MANAGER_ADDRESS".into(),
            )
        })?;
        let wallet = self.starknet_wallet(wallet_id).await?;

        info!(
            wallet_id,
            address = %felt_hex(&wallet.address),
            amount = %format_amount(amount, EARN_DECIMALS),
            "Processing claim"
        );
        let hash = operator.send_earns(wallet.address, amount).await?;
        Ok(SubmittedTransaction {
            transaction_hash: felt_hex(&hash),
            address: Some(felt_hex(&wallet.address)),
        })
    }

    /// Transfer EARN out of the wallet.
    pub async fn withdraw(
        &self,
        credential: &str,
        wallet_id: &str,
        to_address: &str,
        amount: &str,
    ) -> WalletResult<SubmittedTransaction> {
        let user = self.authenticate(credential).await?;
        if to_address.trim().is_empty() {
            return Err(WalletError::InvalidArgument("toAddress is required".into()));
        }
        let recipient = parse_felt(to_address)?;
        let amount = parse_amount(amount, EARN_DECIMALS)?;
        if amount == 0 {
            return Err(WalletError::InvalidArgument(
                "Invalid amount. Must be greater than 0".into(),
            ));
        }
        let wallet = self.starknet_wallet(wallet_id).await?;
        self.require_deployed(wallet.address).await?;

        // Balance
        let balance = self.chain.earn_balance_raw(wallet.address).await?;
        if balance < amount {
            return Err(WalletError::InsufficientBalance(format!(
                "have {} {EARN_SYMBOL}, need {}",
                format_amount(balance, EARN_DECIMALS),
                format_amount(amount, EARN_DECIMALS)
            )));
        }

        info!(
            wallet_id,
            from = %felt_hex(&wallet.address),
            to = %felt_hex(&recipient),
            amount = %format_amount(amount, EARN_DECIMALS),
            "Processing withdrawal"
        );
        let call = self.chain.earn_token().transfer_call(recipient, amount);
        let account = self.account(&user, credential, &wallet).await?;
        let hash = self.submit(&account, vec![call]).await?;
        Ok(SubmittedTransaction {
            transaction_hash: felt_hex(&hash),
            address: Some(felt_hex(&wallet.address)),
        })
    }

    /// Execute arbitrary calls from the wallet. With `wait`, poll for the
    /// receipt; a failed wait is logged and does not fail the request.
    pub async fn execute(
        &self,
        credential: &str,
        wallet_id: &str,
        calls: CallBatch,
        wait: bool,
    ) -> WalletResult<SubmittedTransaction> {
        let user = self.authenticate(credential).await?;
        let calls = calls.into_calls()?;
        let wallet = self.starknet_wallet(wallet_id).await?;
        self.require_deployed(wallet.address).await?;

        let account = self.account(&user, credential, &wallet).await?;
        let hash = self.submit(&account, calls).await?;

        if wait {
            match self.chain.wait_for_transaction(hash, self.wait).await {
                Ok(_) => info!(
                    transaction_hash = %felt_hex(&hash),
                    stage = %OperationStage::Confirmed,
                    "Operation progress"
                ),
                Err(e) => warn!(
                    transaction_hash = %felt_hex(&hash),
                    error = %e,
                    "Failed to wait for transaction"
                ),
            }
        }
        Ok(SubmittedTransaction {
            transaction_hash: felt_hex(&hash),
            address: Some(felt_hex(&wallet.address)),
        })
    }

    async fn submit(
        &self,
        account: &StarknetAccount,
        calls: Vec<Call>,
    ) -> WalletResult<Felt> {
        if self.use_paymaster {
            self.orchestrator.execute_with_paymaster(account, calls, None).await
        } else {
            self.orchestrator.execute_self_sponsored(account, &calls).await
        }
    }
}
