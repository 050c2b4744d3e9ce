// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain integration module for Starknet.
//!
//! This module provides functionality for:
//! - Counterfactual account address derivation
//! - Self-paid v3 transactions through starknet-rs accounts
//! - EARN token balances and transfers
//! - Deployment status and confirmation polling

pub mod account;
pub mod address;
pub mod client;
pub mod erc20;
pub mod fees;
pub mod rpc;
pub mod signing;
pub mod transport;
pub mod types;

pub use account::{AccountIdentity, DeploymentContext, DeploymentPayload, StarknetAccount};
pub use client::{StarknetClient, WaitOptions};
pub use rpc::{ChainProvider, JsonRpcProvider, ProviderCache, TransactionOutcome};
pub use signing::{CustodySigner, LocalSigner, StarkSignature, StarkSigner};
pub use types::*;
