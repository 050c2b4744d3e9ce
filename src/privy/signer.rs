// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Remote signer backed by the custody provider's signing oracle.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use starknet::core::types::Felt;
use tracing::debug;

use super::client::{IdentityProvider, SignRequest};
use crate::blockchain::signing::{StarkSignature, StarkSigner};
use crate::error::{WalletError, WalletResult};

/// Locations of the signature in oracle responses, tried in order.
pub const SIGNATURE_FIELDS: [&str; 4] = [
    "/signature",
    "/result/signature",
    "/result",
    "/data/signature",
];

/// First non-empty string found at one of [`SIGNATURE_FIELDS`].
pub fn extract_signature(response: &Value) -> Option<&str> {
    SIGNATURE_FIELDS
        .iter()
        .filter_map(|field| response.pointer(field).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

/// Signer for one custodial wallet.
pub struct RemoteSigner {
    provider: Arc<dyn IdentityProvider>,
    wallet_id: String,
    credential: String,
    authorization_key: Option<String>,
}

impl RemoteSigner {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        wallet_id: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            wallet_id: wallet_id.into(),
            credential: credential.into(),
            authorization_key: None,
        }
    }

    pub fn with_authorization_key(mut self, key: Option<String>) -> Self {
        self.authorization_key = key;
        self
    }

    pub fn wallet_id(&self) -> &str {
        &self.wallet_id
    }

    /// Sign `hash` through the oracle.
    pub async fn sign(&self, hash: Felt) -> WalletResult<StarkSignature> {
        let response = self
            .provider
            .sign_hash(SignRequest {
                wallet_id: &self.wallet_id,
                hash,
                credential: &self.credential,
                authorization_key: self.authorization_key.as_deref(),
            })
            .await?;

        let raw = extract_signature(&response).ok_or_else(|| {
            WalletError::MalformedSignature("no signature in signing response".into())
        })?;
        debug!(wallet_id = %self.wallet_id, "Signature received");
        StarkSignature::from_oracle_hex(raw)
    }
}

#[async_trait]
impl StarkSigner for RemoteSigner {
    async fn sign_raw(&self, hash: Felt) -> WalletResult<StarkSignature> {
        self.sign(hash).await
    }
}
