// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Starknet Custody - Custodial Starknet Wallet Core
//!
//! Counterfactual account addresses derived from custody-held keys, remote
//! signing through Privy, and deployment/execution through a SNIP-29
//! paymaster or self-paid v3 transactions.
//!
//! ## Modules
//!
//! - `auth` - Privy credential verification (ES256 JWT, cached JWKS)
//! - `blockchain` - Starknet addresses, transactions, RPC and token binding
//! - `builder` - Account builder binding wallets to remote signers
//! - `orchestrator` - Deploy/execute flows and operator reward transfers
//! - `paymaster` - SNIP-29 client, fee negotiation, legacy sponsor API
//! - `privy` - Custody REST client, remote signer, authorization keys
//! - `service` - Wallet use cases

pub mod auth;
pub mod blockchain;
pub mod builder;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod paymaster;
pub mod privy;
pub mod service;
pub mod state;

#[cfg(test)]
mod test_support;

pub use error::{ApiResponse, WalletError, WalletResult};
pub use service::WalletService;
pub use state::CoreState;
