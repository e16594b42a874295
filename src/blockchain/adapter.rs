// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Seams between the orchestration layer and the chain.
//!
//! The provisioning saga and fund-movement orchestrator only talk to the
//! chain through these traits, so they can run against the live Sepolia
//! client or an in-process mock.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use super::client::ChainResult;
use super::types::{ChainCall, TxReceipt, WalletDeployment};
use crate::custody::RawKey;

/// Chain RPC access for one settlement-asset contract.
#[async_trait]
pub trait SignerAdapter: Send + Sync {
    /// Sign, broadcast and wait for the receipt of `call` sent from `key`.
    ///
    /// Blocks until the transaction is mined or the confirmation timeout
    /// elapses. A mined transaction with failed status is `Reverted`.
    async fn submit(&self, key: &RawKey, call: ChainCall) -> ChainResult<TxReceipt>;

    /// Settlement-asset balance of `owner` in base units.
    async fn balance_of(&self, owner: Address) -> ChainResult<U256>;

    /// Settlement-asset decimals.
    async fn decimals(&self) -> ChainResult<u8>;

    /// Settlement-asset symbol.
    async fn symbol(&self) -> ChainResult<String>;

    /// Address of the settlement-asset contract.
    fn settlement_token(&self) -> Address;

    /// Latest block number (readiness check).
    async fn block_number(&self) -> ChainResult<u64>;
}

/// Deterministic multisig wallet deployment.
#[async_trait]
pub trait WalletFactory: Send + Sync {
    /// Address the wallet for `owner` and `salt` will have once deployed.
    async fn predict_address(&self, owner: Address, salt: U256) -> ChainResult<Address>;

    /// Deploy the wallet from the operating signer.
    async fn deploy(&self, owner: Address, salt: U256) -> ChainResult<WalletDeployment>;

    /// Whether contract code exists at `wallet`.
    async fn is_deployed(&self, wallet: Address) -> ChainResult<bool>;
}

/// Execution of calls through a single-owner multisig wallet.
#[async_trait]
pub trait MultisigWallet: Send + Sync {
    /// Create, sign with `owner_key` and execute `call` from `wallet`.
    async fn execute(
        &self,
        owner_key: &RawKey,
        wallet: Address,
        call: ChainCall,
    ) -> ChainResult<TxReceipt>;
}
