// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account builder: binds a custodial wallet to a remote signer.

use std::sync::Arc;

use starknet::core::types::Felt;
use tracing::debug;

use crate::blockchain::account::{AccountIdentity, DeploymentContext, StarknetAccount};
use crate::blockchain::types::felt_hex;
use crate::error::{WalletError, WalletResult};
use crate::paymaster::PaymasterNegotiator;
use crate::privy::client::IdentityProvider;
use crate::privy::signer::RemoteSigner;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Attach the paymaster negotiator to the account.
    pub use_paymaster: bool,
    /// Address reported by the custody service, cross-checked against the
    /// derived one.
    pub known_address: Option<Felt>,
    /// Authorization key forwarded with every signing request.
    pub authorization_key: Option<String>,
}

/// Builds [`StarknetAccount`]s for custodial wallets. Performs no I/O.
#[derive(Clone)]
pub struct AccountBuilder {
    provider: Arc<dyn IdentityProvider>,
    chain_id: Felt,
    paymaster: Option<PaymasterNegotiator>,
}

impl AccountBuilder {
    pub fn new(provider: Arc<dyn IdentityProvider>, chain_id: Felt) -> Self {
        Self {
            provider,
            chain_id,
            paymaster: None,
        }
    }

    pub fn with_paymaster(mut self, paymaster: PaymasterNegotiator) -> Self {
        self.paymaster = Some(paymaster);
        self
    }

    pub fn build(
        &self,
        identity: &AccountIdentity,
        credential: &str,
        options: BuildOptions,
    ) -> WalletResult<StarknetAccount> {
        if credential.trim().is_empty() {
            return Err(WalletError::InvalidArgument("credential is required".into()));
        }
        let context = DeploymentContext::resolve(identity, options.known_address)?;

        let signer = RemoteSigner::new(
            Arc::clone(&self.provider),
            identity.wallet_id.clone(),
            credential,
        )
        .with_authorization_key(options.authorization_key);

        let mut account = StarknetAccount::new(context.address, self.chain_id, Arc::new(signer))
            .with_identity(identity.clone());
        if options.use_paymaster {
            let paymaster = self
                .paymaster
                .clone()
                .ok_or_else(|| WalletError::MissingConfig("paymaster".into()))?;
            account = account.with_paymaster(paymaster);
        }

        debug!(
            wallet_id = %identity.wallet_id,
            address = %felt_hex(&context.address),
            paymaster = options.use_paymaster,
            "Account built"
        );
        Ok(account)
    }
}
