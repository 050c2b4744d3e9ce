// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resource bounds for self-paid v3 transactions.

use starknet::core::types::{FeeEstimate, Felt, ResourceBounds, ResourceBoundsMapping};

use crate::error::{WalletError, WalletResult};
use crate::paymaster::apply_safety_margin;

fn quantity(value: Felt, field: &str) -> WalletResult<u128> {
    u128::try_from(value)
        .map_err(|_| WalletError::provider(502, format!("fee estimate {field} exceeds u128")))
}

fn bound(consumed: Felt, price: Felt, resource: &str) -> WalletResult<ResourceBounds> {
    let amount = apply_safety_margin(quantity(consumed, resource)?)?;
    Ok(ResourceBounds {
        max_amount: u64::try_from(amount).map_err(|_| {
            WalletError::provider(502, format!("{resource} amount {amount} exceeds u64"))
        })?,
        max_price_per_unit: apply_safety_margin(quantity(price, resource)?)?,
    })
}

/// Bounds derived from a node estimate with the safety margin applied to
/// every amount and every price.
pub fn bounds_from_estimate(estimate: &FeeEstimate) -> WalletResult<ResourceBoundsMapping> {
    Ok(ResourceBoundsMapping {
        l1_gas: bound(estimate.l1_gas_consumed, estimate.l1_gas_price, "l1_gas")?,
        l1_data_gas: bound(
            estimate.l1_data_gas_consumed,
            estimate.l1_data_gas_price,
            "l1_data_gas",
        )?,
        l2_gas: bound(estimate.l2_gas_consumed, estimate.l2_gas_price, "l2_gas")?,
    })
}

/// Highest fee the bounds allow, `None` if it does not fit in `u128`.
pub fn max_fee(bounds: &ResourceBoundsMapping) -> Option<u128> {
    [&bounds.l1_gas, &bounds.l2_gas, &bounds.l1_data_gas]
        .into_iter()
        .try_fold(0u128, |total, b| {
            u128::from(b.max_amount)
                .checked_mul(b.max_price_per_unit)
                .and_then(|fee| total.checked_add(fee))
        })
}
