// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fidg Custody Server - Custodial Safe Wallet Orchestrator
//!
//! Provisions a custodial owner key and Safe multisig wallet for each user on
//! Sepolia, and moves the settlement token between that wallet, third parties
//! and the savings reserve while keeping the off-chain ledger in step.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Password accounts and session tokens
//! - `blockchain` - Sepolia RPC, ERC-20 and Safe contract integration
//! - `custody` - Owner key generation and encryption at rest
//! - `ledger` - Accounts and transaction history (redb)
//! - `provisioning` - Sign-up and wallet provisioning saga
//! - `funds` - Send, invest and withdraw orchestration
//! - `maintenance` - Gas funding retries and reserve solvency checks

pub mod api;
pub mod auth;
pub mod blockchain;
pub mod config;
pub mod custody;
pub mod error;
pub mod funds;
pub mod ledger;
pub mod locks;
pub mod maintenance;
pub mod providers;
pub mod provisioning;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
