// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use alloy::primitives::{Address, Bytes, U256};

/// EVM network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// Default RPC endpoint URL
    pub rpc_url: &'static str,
    /// Block explorer URL
    pub explorer_url: &'static str,
}

/// Ethereum Sepolia testnet configuration.
pub const SEPOLIA: NetworkConfig = NetworkConfig {
    name: "Sepolia",
    chain_id: 11155111,
    rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
    explorer_url: "https://sepolia.etherscan.io",
};

impl NetworkConfig {
    /// Explorer link for a transaction hash.
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url, tx_hash)
    }
}

/// Safe v1.4.1 deployment on Sepolia.
pub struct SafeDeploymentAddresses {
    pub proxy_factory: &'static str,
    pub singleton: &'static str,
    pub fallback_handler: &'static str,
}

pub const SAFE_V141_SEPOLIA: SafeDeploymentAddresses = SafeDeploymentAddresses {
    proxy_factory: "0x4e1DCf7AD4e460CfD30791CCC4F9c8a4f820ec67",
    singleton: "0x29fcB43b46531BcA003ddC8FCB67FFE91900C762",
    fallback_handler: "0xfd0732Dc9E303f09fCEf3a7388Ad10A83459Ec99",
};

/// A single `to/value/data` call to submit on-chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl ChainCall {
    /// Plain native-currency transfer.
    pub fn native(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            data: Bytes::new(),
        }
    }

    /// Contract call carrying no native value.
    pub fn contract(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: data.into(),
        }
    }
}

/// Receipt of a mined, successful transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash (0x prefixed)
    pub tx_hash: String,
    /// Block number where the transaction was included
    pub block_number: Option<u64>,
    /// Gas actually used
    pub gas_used: u64,
}

/// Result of deploying a multisig wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletDeployment {
    pub address: Address,
    pub tx_hash: String,
}
