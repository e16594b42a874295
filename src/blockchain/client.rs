// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sepolia RPC client implementing the signer adapter.

use std::time::Duration;

use alloy::{
    network::EthereumWallet,
    primitives::{Address, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
};
use async_trait::async_trait;
use tokio::sync::{OnceCell, OwnedMutexGuard};

use super::adapter::SignerAdapter;
use super::erc20::IERC20;
use super::signing::signer_from_key;
use super::types::{ChainCall, NetworkConfig, TxReceipt};
use crate::custody::RawKey;
use crate::locks::AccountLocks;

/// Default bound on waiting for a receipt.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur during blockchain operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// Transport or node failure before anything was broadcast.
    #[error("RPC unavailable: {0}")]
    RpcUnavailable(String),

    /// Node refused the transaction (estimation revert, insufficient funds).
    #[error("Transaction rejected by node: {0}")]
    Rejected(String),

    /// Broadcast, but no receipt within the bound. Outcome unknown.
    #[error("Confirmation timed out for {tx_hash}")]
    ConfirmationTimeout { tx_hash: String },

    /// Mined with failed status.
    #[error("Transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("Contract error: {0}")]
    ContractError(String),
}

pub type ChainResult<T> = Result<T, ChainError>;

/// Classify a send-time RPC error.
///
/// Nothing was broadcast when `send_transaction` fails, so node refusals are
/// terminal and everything else is a transient RPC failure.
pub(crate) fn classify_send_error(message: String) -> ChainError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("insufficient funds")
        || lower.contains("execution reverted")
        || lower.contains("gas required exceeds")
    {
        ChainError::Rejected(message)
    } else {
        ChainError::RpcUnavailable(message)
    }
}

/// Sepolia client bound to the settlement token.
pub struct ChainClient {
    /// Network configuration
    network: NetworkConfig,
    /// RPC endpoint
    rpc_url: url::Url,
    /// Read-only provider
    provider: DynProvider,
    /// Settlement token contract
    token: Address,
    confirmation_timeout: Duration,
    decimals: OnceCell<u8>,
    /// One in-flight broadcast per sender address
    senders: AccountLocks,
}

impl ChainClient {
    /// Create a new client for the given network and settlement token.
    pub fn new(
        network: NetworkConfig,
        rpc_url: &str,
        token: Address,
        confirmation_timeout: Duration,
    ) -> ChainResult<Self> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainError::InvalidRpcUrl(e.to_string()))?;

        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();

        Ok(Self {
            network,
            rpc_url: url,
            provider,
            token,
            confirmation_timeout,
            decimals: OnceCell::new(),
            senders: AccountLocks::new(),
        })
    }

    /// Get the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Read-only provider for contract calls.
    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    /// Whether contract code exists at `address`.
    pub async fn has_code(&self, address: Address) -> ChainResult<bool> {
        let code = self
            .provider
            .get_code_at(address)
            .await
            .map_err(|e| ChainError::RpcUnavailable(e.to_string()))?;
        Ok(!code.is_empty())
    }

    /// Exclusive broadcast slot for `sender`.
    ///
    /// The nonce filler reads the pending count from the node, so a second
    /// transaction from the same key may only be filled once the first one
    /// has been accepted into the mempool.
    pub(crate) async fn sender_slot(&self, sender: Address) -> OwnedMutexGuard<()> {
        self.senders.lock(&sender.to_string()).await
    }

    fn token_contract(&self) -> IERC20::IERC20Instance<DynProvider> {
        IERC20::new(self.token, self.provider.clone())
    }
}

#[async_trait]
impl SignerAdapter for ChainClient {
    async fn submit(&self, key: &RawKey, call: ChainCall) -> ChainResult<TxReceipt> {
        let signer = signer_from_key(key)?;
        let sender = signer.address();
        let signing_provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(self.rpc_url.clone());

        let tx = TransactionRequest::default()
            .to(call.to)
            .value(call.value)
            .input(call.data.into());

        // Held until the node accepts the transaction, never across the
        // confirmation wait.
        let pending = {
            let _slot = self.sender_slot(sender).await;
            signing_provider
                .send_transaction(tx)
                .await
                .map_err(|e| classify_send_error(e.to_string()))?
        };

        let tx_hash = format!("{:?}", pending.tx_hash());
        tracing::debug!(tx_hash = %tx_hash, to = %call.to, "Transaction broadcast");

        // Once broadcast the transaction cannot be recalled; timing out only
        // stops waiting for its receipt.
        let receipt =
            match tokio::time::timeout(self.confirmation_timeout, pending.get_receipt()).await {
                Ok(Ok(receipt)) => receipt,
                Ok(Err(e)) => {
                    tracing::warn!(tx_hash = %tx_hash, error = %e, "Receipt polling failed");
                    return Err(ChainError::ConfirmationTimeout { tx_hash });
                }
                Err(_) => return Err(ChainError::ConfirmationTimeout { tx_hash }),
            };

        if !receipt.status() {
            return Err(ChainError::Reverted { tx_hash });
        }

        Ok(TxReceipt {
            tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used as u64,
        })
    }

    async fn balance_of(&self, owner: Address) -> ChainResult<U256> {
        self.token_contract()
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| ChainError::RpcUnavailable(e.to_string()))
    }

    async fn decimals(&self) -> ChainResult<u8> {
        let decimals = self
            .decimals
            .get_or_try_init(|| async {
                self.token_contract()
                    .decimals()
                    .call()
                    .await
                    .map_err(|e| ChainError::RpcUnavailable(e.to_string()))
            })
            .await?;
        Ok(*decimals)
    }

    async fn symbol(&self) -> ChainResult<String> {
        self.token_contract()
            .symbol()
            .call()
            .await
            .map_err(|e| ChainError::ContractError(e.to_string()))
    }

    fn settlement_token(&self) -> Address {
        self.token
    }

    async fn block_number(&self) -> ChainResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::RpcUnavailable(e.to_string()))
    }
}
