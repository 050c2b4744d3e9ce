// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fee abstraction through a paymaster.
//!
//! - `rpc` - SNIP-29 JSON-RPC client
//! - `negotiator` - fee-mode selection and safety margins
//! - `sponsor` - legacy sponsorship API for operator transfers

pub mod negotiator;
pub mod rpc;
pub mod sponsor;

pub use negotiator::{apply_safety_margin, FeeMode, PaymasterMode, PaymasterNegotiator, TransactionIntent};
pub use rpc::{
    BuiltTransaction, DeploymentData, ExecutableTransaction, ExecuteResponse, HttpPaymasterRpc,
    PaymasterClientCache, PaymasterFeeEstimate, PaymasterRpc, PaymasterTransaction, TokenData,
};
pub use sponsor::{Sponsor, SponsorApproval, SponsorClient};
