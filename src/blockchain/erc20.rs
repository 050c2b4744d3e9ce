// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ERC-20 token and reward manager contract bindings.

use starknet::core::types::Felt;

use super::rpc::ChainProvider;
use super::types::{u256_calldata, u256_from_words, Call};
use crate::error::{WalletError, WalletResult};

/// ERC-20 contract wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Erc20Contract {
    address: Felt,
}

impl Erc20Contract {
    pub fn new(address: Felt) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Felt {
        self.address
    }

    /// Token balance of `owner` in base units.
    pub async fn balance_of(&self, provider: &dyn ChainProvider, owner: Felt) -> WalletResult<u128> {
        let result = provider
            .call(&Call::new(self.address, "balanceOf", vec![owner]))
            .await?;
        u256_from_words(&result)
    }

    /// `transfer(recipient, amount: u256)`.
    pub fn transfer_call(&self, recipient: Felt, amount: u128) -> Call {
        let [low, high] = u256_calldata(amount);
        Call::new(self.address, "transfer", vec![recipient, low, high])
    }
}

/// Reward manager holding the EARN distribution pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarnManager {
    address: Felt,
}

impl EarnManager {
    pub fn new(address: Felt) -> Self {
        Self { address }
    }

    pub fn address(&self) -> Felt {
        self.address
    }

    /// `transfer_earns(recipient, amount: u256)`.
    pub fn transfer_earns_call(&self, recipient: Felt, amount: u128) -> Call {
        let [low, high] = u256_calldata(amount);
        Call::new(self.address, "transfer_earns", vec![recipient, low, high])
    }

    pub async fn get_earns_balance(&self, provider: &dyn ChainProvider) -> WalletResult<u128> {
        let result = provider
            .call(&Call::new(self.address, "get_earns_balance", vec![]))
            .await?;
        u256_from_words(&result)
    }
}

/// Parse a human-readable amount (e.g. "10.5") to base units.
pub fn parse_amount(amount: &str, decimals: u8) -> WalletResult<u128> {
    let amount = amount.trim();
    let parts: Vec<&str> = amount.split('.').collect();

    if parts.len() > 2 || parts[0].is_empty() || !parts[0].bytes().all(|b| b.is_ascii_digit()) {
        return Err(WalletError::InvalidArgument(
            "Invalid amount format".to_string(),
        ));
    }

    let whole = parts[0]
        .parse::<u128>()
        .map_err(|_| WalletError::InvalidArgument("Invalid whole number".to_string()))?;

    let decimal_part = if parts.len() == 2 {
        let dec_str = parts[1];
        if !dec_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WalletError::InvalidArgument("Invalid decimal".to_string()));
        }
        if dec_str.len() > decimals as usize {
            return Err(WalletError::InvalidArgument(format!(
                "Too many decimal places (max {})",
                decimals
            )));
        }
        if dec_str.is_empty() {
            0u128
        } else {
            let padded = format!("{:0<width$}", dec_str, width = decimals as usize);
            padded
                .parse::<u128>()
                .map_err(|_| WalletError::InvalidArgument("Invalid decimal".to_string()))?
        }
    } else {
        0u128
    };

    let multiplier = 10u128
        .checked_pow(decimals as u32)
        .ok_or_else(|| WalletError::InvalidArgument("Too many decimals".to_string()))?;
    whole
        .checked_mul(multiplier)
        .and_then(|w| w.checked_add(decimal_part))
        .ok_or_else(|| WalletError::InvalidArgument("Amount overflow".to_string()))
}

/// Format base units for display, keeping at most 6 decimal places.
pub fn format_amount(amount: u128, decimals: u8) -> String {
    if amount == 0 {
        return "0".to_string();
    }

    let divisor = 10u128.pow(decimals as u32);
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder == 0 {
        return whole.to_string();
    }
    let decimal_str = format!("{:0>width$}", remainder, width = decimals as usize);
    let trimmed = decimal_str.trim_end_matches('0');
    if trimmed.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, &trimmed[..trimmed.len().min(6)])
    }
}
