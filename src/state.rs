// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use starknet::core::types::BlockTag;

use crate::blockchain::rpc::{JsonRpcProvider, ProviderCache};
use crate::config::WalletConfig;
use crate::error::WalletResult;
use crate::paymaster::{HttpPaymasterRpc, PaymasterClientCache};
use crate::privy::AuthorizationKeyCache;

/// Process-wide caches, created once and shared by every service instance.
#[derive(Clone, Default)]
pub struct CoreState {
    pub providers: Arc<ProviderCache>,
    pub paymasters: Arc<PaymasterClientCache>,
    pub authorization_keys: Arc<AuthorizationKeyCache>,
}

impl CoreState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain node connection for the configured RPC URL.
    pub fn chain_provider(&self, config: &WalletConfig) -> WalletResult<Arc<JsonRpcProvider>> {
        self.providers
            .get_or_create(&config.starknet.rpc_url, BlockTag::Latest)
    }

    pub fn paymaster(&self, config: &WalletConfig) -> WalletResult<Arc<HttpPaymasterRpc>> {
        self.paymasters.get_or_init(&config.paymaster)
    }
}
