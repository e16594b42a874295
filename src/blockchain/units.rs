// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Conversion between human-readable amounts and token base units.

use alloy::primitives::U256;

/// Errors from parsing a decimal amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount is empty")]
    Empty,

    #[error("Amount must be a plain positive decimal number")]
    InvalidFormat,

    #[error("Too many decimal places (max {0})")]
    TooPrecise(u8),

    #[error("Amount must be greater than zero")]
    Zero,

    #[error("Amount overflow")]
    Overflow,
}

/// Parse a human-readable amount to base units.
///
/// Accepts `123`, `123.45` and `.5`; rejects signs, exponents and
/// whitespace. Zero is rejected.
///
/// # Arguments
/// * `amount` - Amount as a string (e.g., "1.5")
/// * `decimals` - Number of decimals of the token (18 for ETH)
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, AmountError> {
    let (whole, fraction) = split_amount(amount)?;
    if fraction.len() > decimals as usize {
        return Err(AmountError::TooPrecise(decimals));
    }

    let whole_units = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).map_err(|_| AmountError::Overflow)?
    };

    // Pad with zeros to match decimals
    let padded = format!("{:0<width$}", fraction, width = decimals as usize);
    let fraction_units = if padded.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&padded, 10).map_err(|_| AmountError::Overflow)?
    };

    let multiplier = U256::from(10u64).pow(U256::from(decimals));
    let total = whole_units
        .checked_mul(multiplier)
        .and_then(|w| w.checked_add(fraction_units))
        .ok_or(AmountError::Overflow)?;

    if total.is_zero() {
        return Err(AmountError::Zero);
    }

    Ok(total)
}

/// Check the syntax of an amount without knowing the token's decimals.
///
/// Catches empty input, signs, exponents and stray characters.
pub fn check_amount_format(amount: &str) -> Result<(), AmountError> {
    split_amount(amount).map(|_| ())
}

fn split_amount(amount: &str) -> Result<(&str, &str), AmountError> {
    if amount.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::InvalidFormat);
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(AmountError::InvalidFormat);
    }

    Ok((whole, fraction))
}

/// Format base units to a human-readable amount.
pub fn format_amount(amount: U256, decimals: u8) -> String {
    if amount.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / divisor;
    let remainder = amount % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let decimal_str = format!(
            "{:0>width$}",
            remainder.to_string(),
            width = decimals as usize
        );
        let trimmed = decimal_str.trim_end_matches('0');
        format!("{}.{}", whole, trimmed)
    }
}
