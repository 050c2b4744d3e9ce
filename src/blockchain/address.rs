// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Counterfactual account address derivation.
//!
//! An account's address is fixed by its public key (used as the deployment
//! salt), its class hash and its constructor calldata, with a zero deployer.
//! The address is therefore known, and can receive funds, before the
//! account contract exists on chain.

use sha3::{Digest, Keccak256};
use starknet::core::{types::Felt, utils::get_contract_address};

use super::types::{felt_hex, parse_felt};
use crate::error::{WalletError, WalletResult};

/// Constructor signer variant for a plain Starknet key.
const SIGNER_VARIANT_STARKNET: Felt = Felt::ZERO;
/// `Option::None` for the guardian slot.
const GUARDIAN_NONE: Felt = Felt::ONE;

/// Constructor calldata: `[signer variant, public key, guardian = None]`.
pub fn constructor_calldata(public_key: Felt) -> Vec<Felt> {
    vec![SIGNER_VARIANT_STARKNET, public_key, GUARDIAN_NONE]
}

/// Deterministic account address for a key and account class.
pub fn derive_address(public_key: Felt, class_hash: Felt) -> Felt {
    get_contract_address(
        public_key,
        class_hash,
        &constructor_calldata(public_key),
        Felt::ZERO,
    )
}

/// Hex-string entry point for [`derive_address`].
pub fn derive_address_hex(public_key: &str, class_hash: &str) -> WalletResult<String> {
    let public_key = parse_felt(public_key)?;
    let class_hash = parse_felt(class_hash)?;
    Ok(felt_hex(&derive_address(public_key, class_hash)))
}

/// Stable pseudo public key for a user id: keccak-256 masked to 251 bits.
pub fn user_public_key(user_id: &str) -> Felt {
    let mut digest: [u8; 32] = Keccak256::digest(user_id.as_bytes()).into();
    digest[0] &= 0x07;
    Felt::from_bytes_be(&digest)
}

/// Address a user id maps to, using the same derivation as the account
/// builder.
pub fn predict_address_for_user(user_id: &str, class_hash: Felt) -> WalletResult<Felt> {
    if user_id.trim().is_empty() {
        return Err(WalletError::InvalidArgument("user id is required".into()));
    }
    Ok(derive_address(user_public_key(user_id), class_hash))
}

/// Check an address reported by the custody service against the derived one.
pub fn verify_reported_address(
    public_key: Felt,
    class_hash: Felt,
    reported: Felt,
) -> WalletResult<Felt> {
    let expected = derive_address(public_key, class_hash);
    if expected != reported {
        return Err(WalletError::AddressMismatch {
            expected: felt_hex(&expected),
            actual: felt_hex(&reported),
        });
    }
    Ok(expected)
}
