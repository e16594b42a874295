// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain integration for Ethereum Sepolia.
//!
//! This module provides functionality for:
//! - Submitting and confirming transactions for a custodied key
//! - Querying the settlement token (balance, decimals, symbol)
//! - Predicting, deploying and executing through Safe multisig wallets

pub mod adapter;
pub mod client;
pub mod erc20;
pub mod safe;
pub mod signing;
pub mod types;
pub mod units;

pub use adapter::{MultisigWallet, SignerAdapter, WalletFactory};
pub use client::{ChainClient, ChainError, ChainResult, DEFAULT_CONFIRMATION_TIMEOUT};
pub use safe::{SafeClient, SafeContracts};
pub use types::*;
pub use units::{check_amount_format, format_amount, parse_amount, AmountError};
