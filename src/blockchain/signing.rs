// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction signing for Starknet accounts.
//!
//! Accounts sign through the [`StarkSigner`] capability: either a remote
//! oracle (custodial wallets, see `privy::signer`) or a local key (the
//! operator account).

use std::sync::Arc;

use async_trait::async_trait;
use starknet::core::crypto::Signature;
use starknet::core::types::Felt;
use starknet::signers::{Signer, SignerInteractivityContext, SigningKey, VerifyingKey};

use super::types::{felt_fixed_hex, parse_felt};
use crate::error::{WalletError, WalletResult};

/// Stark curve ECDSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarkSignature {
    pub r: Felt,
    pub s: Felt,
}

/// Length of an `r || s` signature in hex digits.
pub const SIGNATURE_HEX_LEN: usize = 128;

impl StarkSignature {
    /// Parse the oracle form: 128 hex digits, optional `0x`, `r` then `s`.
    pub fn from_oracle_hex(raw: &str) -> WalletResult<Self> {
        let trimmed = raw.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if hex.len() != SIGNATURE_HEX_LEN {
            return Err(WalletError::MalformedSignature(format!(
                "expected {SIGNATURE_HEX_LEN} hex characters, got {}",
                hex.len()
            )));
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WalletError::MalformedSignature(
                "signature contains non-hex characters".into(),
            ));
        }
        let (r, s) = hex.split_at(SIGNATURE_HEX_LEN / 2);
        let r = Felt::from_hex(&format!("0x{r}"))
            .map_err(|_| WalletError::MalformedSignature("r is not a field element".into()))?;
        let s = Felt::from_hex(&format!("0x{s}"))
            .map_err(|_| WalletError::MalformedSignature("s is not a field element".into()))?;
        Ok(Self { r, s })
    }

    /// `0x` + `r || s`, 128 hex digits.
    pub fn to_oracle_hex(&self) -> String {
        let r = felt_fixed_hex(&self.r);
        let s = felt_fixed_hex(&self.s);
        format!("{r}{}", &s[2..])
    }

    /// Account signature as transaction calldata.
    pub fn to_vec(&self) -> Vec<Felt> {
        vec![self.r, self.s]
    }
}

/// Signing capability bound to one account.
#[async_trait]
pub trait StarkSigner: Send + Sync {
    /// Sign a 32-byte message hash (a transaction or typed-data hash).
    async fn sign_raw(&self, hash: Felt) -> WalletResult<StarkSignature>;
}

/// Locally held Stark key.
pub struct LocalSigner {
    key: SigningKey,
}

impl LocalSigner {
    pub fn from_secret(secret: Felt) -> Self {
        Self {
            key: SigningKey::from_secret_scalar(secret),
        }
    }

    pub fn from_hex(secret: &str) -> WalletResult<Self> {
        let secret = parse_felt(secret)
            .map_err(|_| WalletError::InvalidArgument("Invalid private key".into()))?;
        Ok(Self::from_secret(secret))
    }

    pub fn public_key(&self) -> Felt {
        self.key.verifying_key().scalar()
    }
}

#[async_trait]
impl StarkSigner for LocalSigner {
    async fn sign_raw(&self, hash: Felt) -> WalletResult<StarkSignature> {
        let signature = self
            .key
            .sign(&hash)
            .map_err(|e| WalletError::InvalidArgument(format!("signing failed: {e}")))?;
        Ok(StarkSignature {
            r: signature.r,
            s: signature.s,
        })
    }
}

/// [`StarkSigner`] as a starknet-rs [`Signer`], for use with the account
/// and factory types of `starknet::accounts`.
///
/// Reported as interactive: fee estimation then runs unsigned with
/// `SKIP_VALIDATE` and each transaction costs exactly one oracle request.
#[derive(Clone)]
pub struct CustodySigner {
    inner: Arc<dyn StarkSigner>,
    public_key: Option<Felt>,
}

impl CustodySigner {
    pub fn new(inner: Arc<dyn StarkSigner>, public_key: Option<Felt>) -> Self {
        Self { inner, public_key }
    }
}

#[async_trait]
impl Signer for CustodySigner {
    type GetPublicKeyError = WalletError;
    type SignError = WalletError;

    async fn get_public_key(&self) -> Result<VerifyingKey, Self::GetPublicKeyError> {
        self.public_key
            .map(VerifyingKey::from_scalar)
            .ok_or_else(|| WalletError::InvalidArgument("account public key is unknown".into()))
    }

    async fn sign_hash(&self, hash: &Felt) -> Result<Signature, Self::SignError> {
        let signature = self.inner.sign_raw(*hash).await?;
        Ok(Signature {
            r: signature.r,
            s: signature.s,
        })
    }

    fn is_interactive(&self, _context: SignerInteractivityContext<'_>) -> bool {
        true
    }
}

/// Verify a signature against a public key.
pub fn verify_signature(public_key: Felt, hash: Felt, signature: &StarkSignature) -> bool {
    starknet::core::crypto::ecdsa_verify(
        &public_key,
        &hash,
        &Signature {
            r: signature.r,
            s: signature.s,
        },
    )
    .unwrap_or(false)
}
