// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Privy custody integration.
//!
//! - `client` - REST API (wallets, raw signing, user signers)
//! - `signer` - remote signer adapter producing Stark signatures
//! - `auth_keys` - per-user authorization key cache
//! - `authorization` - P-256 request authorization signatures

pub mod auth_keys;
pub mod authorization;
pub mod client;
pub mod signer;

pub use auth_keys::AuthorizationKeyCache;
pub use client::{IdentityProvider, PrivyClient, ProviderWallet, SignRequest, UserSigner};
pub use signer::RemoteSigner;
