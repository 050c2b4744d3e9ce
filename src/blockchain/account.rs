// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Starknet accounts bound to a signer.

use std::sync::Arc;

use starknet::accounts::single_owner::SignError;
use starknet::accounts::{
    Account, AccountError, AccountFactory, AccountFactoryError, ArgentAccountFactory,
    ExecutionEncoding, SingleOwnerAccount,
};
use starknet::core::types::Felt;
use tracing::{debug, info};

use super::address::{constructor_calldata, derive_address, verify_reported_address};
use super::fees::{bounds_from_estimate, max_fee};
use super::rpc::{wallet_error, ChainProvider};
use super::signing::{CustodySigner, StarkSignature, StarkSigner};
use super::transport::{ChainClient, ChainTransport};
use super::types::{felt_hex, Call};
use crate::error::{WalletError, WalletResult};
use crate::paymaster::{DeploymentData, PaymasterNegotiator};

type CustodyAccount = SingleOwnerAccount<ChainClient, CustodySigner>;
type AccountDeployer = ArgentAccountFactory<CustodySigner, ChainClient>;

/// Identity of a custodial wallet on Starknet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountIdentity {
    /// Custody service wallet id.
    pub wallet_id: String,
    pub public_key: Felt,
    pub class_hash: Felt,
}

impl AccountIdentity {
    pub fn new(wallet_id: impl Into<String>, public_key: Felt, class_hash: Felt) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            public_key,
            class_hash,
        }
    }

    pub fn address(&self) -> Felt {
        derive_address(self.public_key, self.class_hash)
    }
}

/// Everything needed to deploy an account contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPayload {
    pub class_hash: Felt,
    pub contract_address: Felt,
    pub constructor_calldata: Vec<Felt>,
    pub address_salt: Felt,
}

/// Address and calldata resolved once per deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentContext {
    pub identity: AccountIdentity,
    pub constructor_calldata: Vec<Felt>,
    pub address: Felt,
}

impl DeploymentContext {
    /// Derive the address, cross-checking it against `reported` if given.
    pub fn resolve(identity: &AccountIdentity, reported: Option<Felt>) -> WalletResult<Self> {
        let address = match reported {
            Some(reported) => {
                verify_reported_address(identity.public_key, identity.class_hash, reported)?
            }
            None => identity.address(),
        };
        Ok(Self {
            identity: identity.clone(),
            constructor_calldata: constructor_calldata(identity.public_key),
            address,
        })
    }

    pub fn payload(&self) -> DeploymentPayload {
        DeploymentPayload {
            class_hash: self.identity.class_hash,
            contract_address: self.address,
            constructor_calldata: self.constructor_calldata.clone(),
            address_salt: self.identity.public_key,
        }
    }

    pub fn paymaster_deployment(&self) -> DeploymentData {
        DeploymentData {
            address: self.address,
            class_hash: self.identity.class_hash,
            salt: self.identity.public_key,
            calldata: self.constructor_calldata.clone(),
            sigdata: None,
        }
    }
}

/// Account handle: address, chain, signer and optional paymaster.
#[derive(Clone)]
pub struct StarknetAccount {
    address: Felt,
    chain_id: Felt,
    signer: Arc<dyn StarkSigner>,
    paymaster: Option<PaymasterNegotiator>,
    identity: Option<AccountIdentity>,
}

impl StarknetAccount {
    pub fn new(address: Felt, chain_id: Felt, signer: Arc<dyn StarkSigner>) -> Self {
        Self {
            address,
            chain_id,
            signer,
            paymaster: None,
            identity: None,
        }
    }

    pub fn with_paymaster(mut self, paymaster: PaymasterNegotiator) -> Self {
        self.paymaster = Some(paymaster);
        self
    }

    pub fn with_identity(mut self, identity: AccountIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn address(&self) -> Felt {
        self.address
    }

    pub fn chain_id(&self) -> Felt {
        self.chain_id
    }

    pub fn paymaster(&self) -> Option<&PaymasterNegotiator> {
        self.paymaster.as_ref()
    }

    pub fn identity(&self) -> Option<&AccountIdentity> {
        self.identity.as_ref()
    }

    pub async fn sign_hash(&self, hash: Felt) -> WalletResult<StarkSignature> {
        self.signer.sign_raw(hash).await
    }

    fn connect(&self, provider: Arc<dyn ChainProvider>) -> CustodyAccount {
        let signer = CustodySigner::new(
            Arc::clone(&self.signer),
            self.identity.as_ref().map(|identity| identity.public_key),
        );
        SingleOwnerAccount::new(
            ChainTransport::client(provider),
            signer,
            self.address,
            self.chain_id,
            ExecutionEncoding::New,
        )
    }

    async fn deployer(
        &self,
        provider: Arc<dyn ChainProvider>,
        context: &DeploymentContext,
    ) -> WalletResult<AccountDeployer> {
        let signer = CustodySigner::new(Arc::clone(&self.signer), Some(context.identity.public_key));
        ArgentAccountFactory::new(
            context.identity.class_hash,
            self.chain_id,
            None,
            signer,
            ChainTransport::client(provider),
        )
        .await
    }

    /// Sign and submit a v3 invoke paying its own fee.
    pub async fn execute_v3(
        &self,
        provider: Arc<dyn ChainProvider>,
        calls: &[Call],
    ) -> WalletResult<Felt> {
        let nonce = provider.get_nonce(self.address).await?;
        let calls = calls
            .iter()
            .map(Call::to_starknet_call)
            .collect::<WalletResult<Vec<_>>>()?;

        let account = self.connect(provider);
        let execution = account.execute_v3(calls).nonce(nonce);
        let estimate = execution.estimate_fee().await.map_err(account_error)?;
        let bounds = bounds_from_estimate(&estimate)?;
        debug!(
            address = %felt_hex(&self.address),
            max_fee = ?max_fee(&bounds),
            "Invoke fee bounds resolved"
        );

        let submitted = execution
            .l1_gas(bounds.l1_gas.max_amount)
            .l1_gas_price(bounds.l1_gas.max_price_per_unit)
            .l2_gas(bounds.l2_gas.max_amount)
            .l2_gas_price(bounds.l2_gas.max_price_per_unit)
            .l1_data_gas(bounds.l1_data_gas.max_amount)
            .l1_data_gas_price(bounds.l1_data_gas.max_price_per_unit)
            .send()
            .await
            .map_err(account_error)?;
        info!(
            address = %felt_hex(&self.address),
            transaction_hash = %felt_hex(&submitted.transaction_hash),
            "Invoke transaction submitted"
        );
        Ok(submitted.transaction_hash)
    }

    /// Sign and submit a v3 deploy-account paying its own fee. Returns
    /// `(transaction_hash, contract_address)`.
    pub async fn deploy_v3(
        &self,
        provider: Arc<dyn ChainProvider>,
        context: &DeploymentContext,
    ) -> WalletResult<(Felt, Felt)> {
        let deployer = self.deployer(provider, context).await?;
        let deployment = deployer.deploy_v3(context.identity.public_key);
        if deployment.address() != context.address {
            return Err(WalletError::AddressMismatch {
                expected: felt_hex(&context.address),
                actual: felt_hex(&deployment.address()),
            });
        }

        let nonce = deployment
            .fetch_nonce()
            .await
            .map_err(|e| wallet_error(e, false))?;
        let deployment = deployment.nonce(nonce);
        let estimate = deployment.estimate_fee().await.map_err(factory_error)?;
        let bounds = bounds_from_estimate(&estimate)?;

        let submitted = deployment
            .l1_gas(bounds.l1_gas.max_amount)
            .l1_gas_price(bounds.l1_gas.max_price_per_unit)
            .l2_gas(bounds.l2_gas.max_amount)
            .l2_gas_price(bounds.l2_gas.max_price_per_unit)
            .l1_data_gas(bounds.l1_data_gas.max_amount)
            .l1_data_gas_price(bounds.l1_data_gas.max_price_per_unit)
            .send()
            .await
            .map_err(factory_error)?;
        info!(
            address = %felt_hex(&submitted.contract_address),
            transaction_hash = %felt_hex(&submitted.transaction_hash),
            "Deploy account transaction submitted"
        );
        Ok((submitted.transaction_hash, submitted.contract_address))
    }
}

fn account_error(error: AccountError<SignError<WalletError>>) -> WalletError {
    match error {
        AccountError::Signing(SignError::Signer(e)) => e,
        AccountError::Signing(SignError::ClassHash(e)) => {
            WalletError::InvalidArgument(e.to_string())
        }
        AccountError::Provider(e) => wallet_error(e, true),
        AccountError::ClassHashCalculation(e) => WalletError::InvalidArgument(e.to_string()),
        AccountError::FeeOutOfRange => WalletError::provider(502, "fee calculation overflow"),
    }
}

fn factory_error(error: AccountFactoryError<WalletError>) -> WalletError {
    match error {
        AccountFactoryError::Signing(e) => e,
        AccountFactoryError::Provider(e) => wallet_error(e, true),
        AccountFactoryError::FeeOutOfRange => {
            WalletError::provider(502, "fee calculation overflow")
        }
    }
}
