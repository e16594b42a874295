// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Safe (v1.4.1) multisig wallets: address prediction, deployment through the
//! proxy factory, and single-owner transaction execution.

use std::sync::Arc;

use alloy::{
    primitives::{keccak256, Address, Bytes, B256, U256},
    providers::DynProvider,
    signers::SignerSync,
    sol,
    sol_types::SolCall,
};
use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::adapter::{MultisigWallet, SignerAdapter, WalletFactory};
use super::client::{ChainClient, ChainError, ChainResult};
use super::signing::signer_from_key;
use super::types::{ChainCall, SafeDeploymentAddresses, TxReceipt, WalletDeployment};
use crate::custody::RawKey;

sol! {
    #[sol(rpc)]
    interface ISafe {
        function setup(
            address[] owners,
            uint256 threshold,
            address to,
            bytes data,
            address fallbackHandler,
            address paymentToken,
            uint256 payment,
            address paymentReceiver
        ) external;

        function nonce() external view returns (uint256);

        function getTransactionHash(
            address to,
            uint256 value,
            bytes data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            uint256 nonce
        ) external view returns (bytes32);

        function execTransaction(
            address to,
            uint256 value,
            bytes data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes signatures
        ) external payable returns (bool success);
    }

    #[sol(rpc)]
    interface ISafeProxyFactory {
        function proxyCreationCode() external pure returns (bytes);

        function createProxyWithNonce(
            address singleton,
            bytes initializer,
            uint256 saltNonce
        ) external returns (address proxy);
    }
}

/// `Call` operation; delegate calls are never issued.
const OPERATION_CALL: u8 = 0;

/// Parsed Safe contract addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeContracts {
    pub proxy_factory: Address,
    pub singleton: Address,
    pub fallback_handler: Address,
}

impl SafeContracts {
    pub fn from_deployment(deployment: &SafeDeploymentAddresses) -> ChainResult<Self> {
        Ok(Self {
            proxy_factory: parse_address(deployment.proxy_factory)?,
            singleton: parse_address(deployment.singleton)?,
            fallback_handler: parse_address(deployment.fallback_handler)?,
        })
    }
}

fn parse_address(value: &str) -> ChainResult<Address> {
    value
        .parse()
        .map_err(|_| ChainError::InvalidAddress(value.to_string()))
}

/// `setup` calldata for a single-owner, threshold-one Safe.
pub fn safe_initializer(owner: Address, fallback_handler: Address) -> Bytes {
    ISafe::setupCall {
        owners: vec![owner],
        threshold: U256::from(1u64),
        to: Address::ZERO,
        data: Bytes::new(),
        fallbackHandler: fallback_handler,
        paymentToken: Address::ZERO,
        payment: U256::ZERO,
        paymentReceiver: Address::ZERO,
    }
    .abi_encode()
    .into()
}

/// CREATE2 address the proxy factory assigns for `initializer` and `salt_nonce`.
///
/// Mirrors `SafeProxyFactory.createProxyWithNonce`: the salt commits to the
/// initializer hash and nonce, the init code is the proxy creation code
/// followed by the singleton address as a 32-byte word.
pub fn predict_safe_address(
    contracts: &SafeContracts,
    proxy_creation_code: &[u8],
    initializer: &[u8],
    salt_nonce: U256,
) -> Address {
    let mut salt_input = Vec::with_capacity(64);
    salt_input.extend_from_slice(keccak256(initializer).as_slice());
    salt_input.extend_from_slice(&salt_nonce.to_be_bytes::<32>());
    let salt = keccak256(&salt_input);

    let mut init_code = Vec::with_capacity(proxy_creation_code.len() + 32);
    init_code.extend_from_slice(proxy_creation_code);
    init_code.extend_from_slice(&[0u8; 12]);
    init_code.extend_from_slice(contracts.singleton.as_slice());

    contracts
        .proxy_factory
        .create2(salt, keccak256(&init_code))
}

/// Owner signature over a Safe transaction hash, `r || s || v` with v in {27, 28}.
pub fn owner_signature(owner_key: &RawKey, safe_tx_hash: B256) -> ChainResult<Bytes> {
    let signer = signer_from_key(owner_key)?;
    let signature = signer
        .sign_hash_sync(&safe_tx_hash)
        .map_err(|e| ChainError::InvalidKey(e.to_string()))?;
    Ok(Bytes::copy_from_slice(&signature.as_bytes()))
}

/// Safe factory and executor on top of the chain client.
///
/// Deployments are paid by the operator key; executions are paid by the
/// wallet owner's own key.
pub struct SafeClient {
    chain: Arc<ChainClient>,
    contracts: SafeContracts,
    operator_key: Arc<RawKey>,
    proxy_creation_code: OnceCell<Bytes>,
}

impl SafeClient {
    pub fn new(
        chain: Arc<ChainClient>,
        contracts: SafeContracts,
        operator_key: Arc<RawKey>,
    ) -> Self {
        Self {
            chain,
            contracts,
            operator_key,
            proxy_creation_code: OnceCell::new(),
        }
    }

    fn provider(&self) -> DynProvider {
        self.chain.provider().clone()
    }

    async fn creation_code(&self) -> ChainResult<&Bytes> {
        self.proxy_creation_code
            .get_or_try_init(|| async {
                ISafeProxyFactory::new(self.contracts.proxy_factory, self.provider())
                    .proxyCreationCode()
                    .call()
                    .await
                    .map_err(|e| ChainError::RpcUnavailable(e.to_string()))
            })
            .await
    }
}

#[async_trait]
impl WalletFactory for SafeClient {
    async fn predict_address(&self, owner: Address, salt: U256) -> ChainResult<Address> {
        let code = self.creation_code().await?;
        let initializer = safe_initializer(owner, self.contracts.fallback_handler);
        Ok(predict_safe_address(&self.contracts, code, &initializer, salt))
    }

    async fn deploy(&self, owner: Address, salt: U256) -> ChainResult<WalletDeployment> {
        let address = self.predict_address(owner, salt).await?;
        let initializer = safe_initializer(owner, self.contracts.fallback_handler);
        let data = ISafeProxyFactory::createProxyWithNonceCall {
            singleton: self.contracts.singleton,
            initializer,
            saltNonce: salt,
        }
        .abi_encode();

        let receipt = self
            .chain
            .submit(
                &self.operator_key,
                ChainCall::contract(self.contracts.proxy_factory, data),
            )
            .await?;

        if !self.chain.has_code(address).await? {
            return Err(ChainError::ContractError(format!(
                "no code at predicted Safe {address} after {}",
                receipt.tx_hash
            )));
        }

        tracing::info!(
            safe = %address,
            owner = %owner,
            tx_hash = %receipt.tx_hash,
            "Safe deployed"
        );

        Ok(WalletDeployment {
            address,
            tx_hash: receipt.tx_hash,
        })
    }

    async fn is_deployed(&self, wallet: Address) -> ChainResult<bool> {
        self.chain.has_code(wallet).await
    }
}

#[async_trait]
impl MultisigWallet for SafeClient {
    async fn execute(
        &self,
        owner_key: &RawKey,
        wallet: Address,
        call: ChainCall,
    ) -> ChainResult<TxReceipt> {
        let safe = ISafe::new(wallet, self.provider());

        let nonce = safe
            .nonce()
            .call()
            .await
            .map_err(|e| ChainError::RpcUnavailable(e.to_string()))?;

        let safe_tx_hash = safe
            .getTransactionHash(
                call.to,
                call.value,
                call.data.clone(),
                OPERATION_CALL,
                U256::ZERO,
                U256::ZERO,
                U256::ZERO,
                Address::ZERO,
                Address::ZERO,
                nonce,
            )
            .call()
            .await
            .map_err(|e| ChainError::RpcUnavailable(e.to_string()))?;

        let signatures = owner_signature(owner_key, safe_tx_hash)?;

        let data = ISafe::execTransactionCall {
            to: call.to,
            value: call.value,
            data: call.data,
            operation: OPERATION_CALL,
            safeTxGas: U256::ZERO,
            baseGas: U256::ZERO,
            gasPrice: U256::ZERO,
            gasToken: Address::ZERO,
            refundReceiver: Address::ZERO,
            signatures,
        }
        .abi_encode();

        tracing::debug!(safe = %wallet, nonce = %nonce, "Executing Safe transaction");

        self.chain
            .submit(owner_key, ChainCall::contract(wallet, data))
            .await
    }
}
