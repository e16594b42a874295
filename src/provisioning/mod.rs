// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Provisioning Saga
//!
//! Creates a user's owner key and Safe wallet, links the wallet in the
//! ledger and funds the owner EOA with gas.
//!
//! ## Failure policy
//!
//! Forward-only with an explicit degraded state:
//!
//! - The account document is written right after key generation, so the
//!   identity survives any later failure.
//! - A failed deployment leaves the wallet address empty and ends in
//!   `AccountCreatedDegraded`. It is not retried automatically; `resume`
//!   redeploys from the persisted salt, which yields the same address.
//! - A failed gas transfer is logged and retried by the maintenance worker.
//!   The account stays usable in `LedgerLinked`.
//!
//! Every entry point holds the account's lock from [`AccountLocks`] for the
//! whole run, so a sweep never funds gas for a sign-up still in flight.

pub mod state;

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{hash_password, AuthError, MIN_PASSWORD_LEN};
use crate::blockchain::{
    ChainCall, ChainError, NetworkConfig, SignerAdapter, WalletDeployment, WalletFactory,
};
use crate::custody::{generate_owner_key, CustodyError, KeyVault, RawKey};
use crate::ledger::{
    AccountPatch, LedgerError, LedgerStore, TokenAmount, TransactionKind, TransactionRecord,
    TransactionStatus, UserAccount,
};
use crate::locks::AccountLocks;

pub use state::ProvisioningState;

/// Errors that abort provisioning outright.
///
/// A failed deployment is not one of them: it is reported through
/// [`ProvisioningReport`] with the degraded state.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("{0}")]
    Validation(String),

    #[error("A user with this email already exists")]
    EmailTaken(String),

    #[error("Account {0} not found")]
    AccountNotFound(String),

    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),

    #[error("Password hashing failed: {0}")]
    Auth(String),

    #[error("Wallet deployment failed: {reason}")]
    DeploymentFailed {
        reason: String,
        tx_hash: Option<String>,
    },

    #[error("{0}")]
    GasFundingFailed(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The chain moved but the ledger did not follow.
    #[error("Ledger write failed after on-chain transaction {tx_hash}: {source}")]
    LedgerWriteFailed {
        tx_hash: String,
        account_id: String,
        #[source]
        source: LedgerError,
    },
}

impl From<AuthError> for ProvisioningError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e.to_string())
    }
}

/// Sign-up input.
#[derive(Debug, Clone)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Outcome of a saga run.
#[derive(Debug, Clone)]
pub struct ProvisioningReport {
    pub account: UserAccount,
    pub state: ProvisioningState,
    pub deployment_tx: Option<String>,
    pub gas_tx: Option<String>,
    /// Failure description when the run ended degraded or unfunded
    pub error: Option<String>,
}

/// Gas funding attempt result, exposed for maintenance sweeps.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GasFunding {
    pub account_id: String,
    pub tx_hash: String,
}

/// Saga dependencies and settings.
pub struct ProvisioningSaga {
    ledger: Arc<dyn LedgerStore>,
    vault: Arc<KeyVault>,
    signer: Arc<dyn SignerAdapter>,
    factory: Arc<dyn WalletFactory>,
    locks: Arc<AccountLocks>,
    operator_key: Arc<RawKey>,
    operator_address: Address,
    network: NetworkConfig,
    currency: String,
    gas_funding_amount: U256,
}

impl ProvisioningSaga {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        vault: Arc<KeyVault>,
        signer: Arc<dyn SignerAdapter>,
        factory: Arc<dyn WalletFactory>,
        locks: Arc<AccountLocks>,
        operator_key: Arc<RawKey>,
        operator_address: Address,
        network: NetworkConfig,
        currency: impl Into<String>,
        gas_funding_amount: U256,
    ) -> Self {
        Self {
            ledger,
            vault,
            signer,
            factory,
            locks,
            operator_key,
            operator_address,
            network,
            currency: currency.into(),
            gas_funding_amount,
        }
    }

    /// Register a user and run the saga to a terminal state.
    pub async fn signup(
        &self,
        request: SignupRequest,
    ) -> Result<ProvisioningReport, ProvisioningError> {
        let name = request.name.trim().to_string();
        let email = request.email.trim().to_lowercase();
        validate_signup(&name, &email, &request.password)?;

        if self.ledger.find_account_by_email(&email)?.is_some() {
            return Err(ProvisioningError::EmailTaken(email));
        }

        // KeyGenerated: the raw key lives only until it is sealed
        let (custody, owner_address) = {
            let (raw, owner_address) = generate_owner_key();
            (self.vault.protect(&raw)?, owner_address)
        };
        let password_hash = hash_password(&request.password)?;

        let now = Utc::now();
        let account = UserAccount {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            password_hash,
            owner_address: owner_address.to_string(),
            custody,
            wallet_address: None,
            wallet_salt: now.timestamp_millis().max(0) as u64,
            unconfirmed_deployment_tx: None,
            savings_balance: TokenAmount::ZERO,
            total_deposited: TokenAmount::ZERO,
            total_withdrawn: TokenAmount::ZERO,
            savings_start_date: None,
            gas_funded: false,
            created_at: now,
            last_activity: now,
        };

        self.ledger.create_account(&account).map_err(|e| match e {
            LedgerError::EmailTaken(email) => ProvisioningError::EmailTaken(email),
            other => ProvisioningError::Ledger(other),
        })?;

        info!(
            account_id = %account.id,
            owner = %owner_address,
            state = %ProvisioningState::KeyGenerated,
            "Account created"
        );

        let _guard = self.locks.lock(&account.id).await;
        self.advance(account).await
    }

    /// Continue provisioning for an existing account.
    ///
    /// A linked account only gets its gas retried; a degraded one is
    /// redeployed (or linked, if the Safe already exists on-chain).
    pub async fn resume(&self, account_id: &str) -> Result<ProvisioningReport, ProvisioningError> {
        let _guard = self.locks.lock(account_id).await;
        let account = self
            .ledger
            .get_account(account_id)?
            .ok_or_else(|| ProvisioningError::AccountNotFound(account_id.to_string()))?;

        self.advance(account).await
    }

    /// Fund the owner EOA of a linked account that has not received gas.
    ///
    /// Returns `Ok(None)` when there is nothing to do.
    pub async fn fund_gas(&self, account_id: &str) -> Result<Option<GasFunding>, ProvisioningError> {
        let _guard = self.locks.lock(account_id).await;
        let account = self
            .ledger
            .get_account(account_id)?
            .ok_or_else(|| ProvisioningError::AccountNotFound(account_id.to_string()))?;

        if account.wallet_address.is_none() || account.gas_funded {
            return Ok(None);
        }

        match self.send_gas(&account).await {
            Ok(tx_hash) => Ok(Some(GasFunding {
                account_id: account.id,
                tx_hash,
            })),
            Err(e) => Err(ProvisioningError::GasFundingFailed(e)),
        }
    }

    async fn advance(&self, account: UserAccount) -> Result<ProvisioningReport, ProvisioningError> {
        let mut deployment_tx = None;

        let account = if account.wallet_address.is_some() {
            account
        } else {
            match self.deploy_wallet(&account).await {
                Ok(deployment) => {
                    deployment_tx = Some(deployment.tx_hash.clone()).filter(|h| !h.is_empty());
                    self.link_wallet(&account, &deployment)?
                }
                Err(e) => {
                    error!(
                        account_id = %account.id,
                        owner = %account.owner_address,
                        error = %e,
                        state = %ProvisioningState::AccountCreatedDegraded,
                        "CRITICAL: Safe deployment failed, account left without wallet"
                    );
                    return Ok(ProvisioningReport {
                        state: ProvisioningState::AccountCreatedDegraded,
                        account,
                        deployment_tx: None,
                        gas_tx: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        };

        if account.gas_funded {
            return Ok(ProvisioningReport {
                state: ProvisioningState::GasFunded,
                account,
                deployment_tx,
                gas_tx: None,
                error: None,
            });
        }

        match self.send_gas(&account).await {
            Ok(gas_tx) => {
                let account = self.ledger.get_account(&account.id)?.unwrap_or(account);
                Ok(ProvisioningReport {
                    state: ProvisioningState::GasFunded,
                    account,
                    deployment_tx,
                    gas_tx: Some(gas_tx),
                    error: None,
                })
            }
            Err(reason) => Ok(ProvisioningReport {
                state: ProvisioningState::LedgerLinked,
                account,
                deployment_tx,
                gas_tx: None,
                error: Some(reason),
            }),
        }
    }

    /// WalletPredicted → WalletDeployed.
    async fn deploy_wallet(
        &self,
        account: &UserAccount,
    ) -> Result<WalletDeployment, ProvisioningError> {
        let owner: Address = account.owner_address.parse().map_err(|_| {
            deployment_failed(format!("invalid owner address {}", account.owner_address), None)
        })?;
        let salt = U256::from(account.wallet_salt);

        let predicted = self
            .factory
            .predict_address(owner, salt)
            .await
            .map_err(chain_deployment_failure)?;
        info!(
            account_id = %account.id,
            safe = %predicted,
            state = %ProvisioningState::WalletPredicted,
            "Safe address predicted"
        );

        // A previous attempt may have deployed without its receipt being seen
        if self
            .factory
            .is_deployed(predicted)
            .await
            .map_err(chain_deployment_failure)?
        {
            warn!(
                account_id = %account.id,
                safe = %predicted,
                "Safe already deployed at predicted address, linking"
            );
            return Ok(WalletDeployment {
                address: predicted,
                tx_hash: account.unconfirmed_deployment_tx.clone().unwrap_or_default(),
            });
        }

        let deployment = match self.factory.deploy(owner, salt).await {
            Ok(deployment) => deployment,
            Err(e) => {
                if let ChainError::ConfirmationTimeout { tx_hash } = &e {
                    self.remember_deployment(account, tx_hash);
                }
                return Err(chain_deployment_failure(e));
            }
        };

        if deployment.address != predicted {
            return Err(deployment_failed(
                format!(
                    "deployed address {} differs from prediction {predicted}",
                    deployment.address
                ),
                Some(deployment.tx_hash),
            ));
        }

        info!(
            account_id = %account.id,
            safe = %deployment.address,
            tx_hash = %deployment.tx_hash,
            state = %ProvisioningState::WalletDeployed,
            "Safe deployed"
        );
        Ok(deployment)
    }

    /// Keep the hash of a deployment that may still land, for linking later.
    fn remember_deployment(&self, account: &UserAccount, tx_hash: &str) {
        let patch = AccountPatch::new().unconfirmed_deployment_tx(tx_hash);
        if let Err(e) = self.ledger.patch_account(&account.id, &patch) {
            warn!(
                account_id = %account.id,
                tx_hash = %tx_hash,
                error = %e,
                "Failed to persist unconfirmed deployment hash"
            );
        }
    }

    /// WalletDeployed → LedgerLinked.
    fn link_wallet(
        &self,
        account: &UserAccount,
        deployment: &WalletDeployment,
    ) -> Result<UserAccount, ProvisioningError> {
        let now = Utc::now();
        let wallet = deployment.address.to_string();
        let (explorer_url, description) = if deployment.tx_hash.is_empty() {
            (
                String::new(),
                format!("Personal vault linked for {} (existing deployment).", account.name),
            )
        } else {
            (
                self.network.tx_url(&deployment.tx_hash),
                format!("Account and personal vault created for {}.", account.name),
            )
        };

        let record = TransactionRecord {
            id: Uuid::new_v4().to_string(),
            account_id: account.id.clone(),
            kind: TransactionKind::WalletCreated,
            amount: TokenAmount::ZERO,
            currency: self.currency.clone(),
            from_address: self.operator_address.to_string(),
            to_address: wallet.clone(),
            status: TransactionStatus::Success,
            tx_hash: deployment.tx_hash.clone(),
            explorer_url,
            timestamp: now,
            description,
        };

        let patch = AccountPatch::new().wallet_address(wallet.clone()).touch(now);
        let linked = self
            .ledger
            .commit_movement(&account.id, &patch, &record)
            .map_err(|source| {
                error!(
                    account_id = %account.id,
                    safe = %wallet,
                    tx_hash = %deployment.tx_hash,
                    error = %source,
                    "CRITICAL: Safe deployed but ledger link failed, reconciliation required"
                );
                ProvisioningError::LedgerWriteFailed {
                    tx_hash: deployment.tx_hash.clone(),
                    account_id: account.id.clone(),
                    source,
                }
            })?;

        info!(
            account_id = %account.id,
            safe = %wallet,
            state = %ProvisioningState::LedgerLinked,
            "Safe linked to account"
        );
        Ok(linked)
    }

    /// LedgerLinked → GasFunded. Failures are logged and returned as text.
    async fn send_gas(&self, account: &UserAccount) -> Result<String, String> {
        let owner: Address = account
            .owner_address
            .parse()
            .map_err(|_| format!("invalid owner address {}", account.owner_address))?;

        let receipt = match self
            .signer
            .submit(
                &self.operator_key,
                ChainCall::native(owner, self.gas_funding_amount),
            )
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(
                    account_id = %account.id,
                    owner = %owner,
                    amount = %self.gas_funding_amount,
                    error = %e,
                    "CRITICAL: Failed to fund owner EOA with gas, will retry"
                );
                return Err(format!("gas funding failed: {e}"));
            }
        };

        if let Err(e) = self
            .ledger
            .patch_account(&account.id, &AccountPatch::new().gas_funded(true))
        {
            error!(
                account_id = %account.id,
                tx_hash = %receipt.tx_hash,
                error = %e,
                "CRITICAL: Gas sent but gas_funded flag not persisted"
            );
            return Err(format!("gas sent in {} but not recorded: {e}", receipt.tx_hash));
        }

        info!(
            account_id = %account.id,
            owner = %owner,
            tx_hash = %receipt.tx_hash,
            state = %ProvisioningState::GasFunded,
            "Owner EOA funded with gas"
        );
        Ok(receipt.tx_hash)
    }
}

fn validate_signup(name: &str, email: &str, password: &str) -> Result<(), ProvisioningError> {
    if name.is_empty() || email.is_empty() || password.is_empty() {
        return Err(ProvisioningError::Validation(
            "All fields are required: name, email, and password.".to_string(),
        ));
    }
    let valid_email = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
        .unwrap_or(false);
    if !valid_email {
        return Err(ProvisioningError::Validation("Invalid email address.".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ProvisioningError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long."
        )));
    }
    Ok(())
}

fn deployment_failed(reason: String, tx_hash: Option<String>) -> ProvisioningError {
    ProvisioningError::DeploymentFailed { reason, tx_hash }
}

fn chain_deployment_failure(e: ChainError) -> ProvisioningError {
    let tx_hash = match &e {
        ChainError::Reverted { tx_hash } | ChainError::ConfirmationTimeout { tx_hash } => {
            Some(tx_hash.clone())
        }
        _ => None,
    };
    deployment_failed(e.to_string(), tx_hash)
}
