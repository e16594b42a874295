// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Fund-Movement Orchestrator
//!
//! Send, invest and withdraw share one protocol:
//!
//! 1. Validate the amount (and recipient, for sends)
//! 2. Load the account; it must have a custody record and a linked wallet
//! 3. Build an ERC-20 transfer and route it:
//!    - send / invest: through the user's Safe, signed with the owner key
//!    - withdraw: directly from the operator reserve to the user's Safe
//! 4. Wait for the receipt
//! 5. Only after confirmation, update balances and append the record in one
//!    ledger write
//!
//! A confirmed transaction whose ledger write fails is logged at `error!`
//! with hash, account and amount, and surfaced as `LedgerWriteFailed`.
//!
//! Per-account serialization is the caller's job (see [`crate::locks`]).

use std::sync::Arc;

use alloy::primitives::Address;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::blockchain::erc20::transfer_call;
use crate::blockchain::{
    check_amount_format, format_amount, parse_amount, ChainError, MultisigWallet, NetworkConfig,
    SignerAdapter, TxReceipt,
};
use crate::custody::{CustodyError, KeyVault, RawKey};
use crate::ledger::{
    AccountPatch, LedgerError, LedgerStore, TokenAmount, TransactionKind, TransactionRecord,
    TransactionStatus, UserAccount,
};

/// Default page size for history queries.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Upper bound on history page size.
pub const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum FundsError {
    #[error("{0}")]
    Validation(String),

    #[error("Account {0} not found")]
    AccountNotFound(String),

    #[error("Account {0} has no provisioned wallet")]
    WalletNotProvisioned(String),

    #[error("Custody error: {0}")]
    Custody(String),

    #[error("Chain RPC unavailable: {0}")]
    RpcUnavailable(String),

    /// Outcome unknown: re-query the chain before retrying.
    #[error("Transaction {tx_hash} was not confirmed in time")]
    ConfirmationTimeout { tx_hash: String },

    #[error("Transaction reverted: {reason}")]
    OnChainRevert {
        tx_hash: Option<String>,
        reason: String,
    },

    #[error("Reserve holds {available}, cannot cover {requested}")]
    ReserveInsufficient {
        available: String,
        requested: String,
    },

    /// The chain moved but the ledger did not follow.
    #[error("Ledger write failed after on-chain transaction {tx_hash}: {source}")]
    LedgerWriteFailed {
        tx_hash: String,
        account_id: String,
        #[source]
        source: LedgerError,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CustodyError> for FundsError {
    fn from(e: CustodyError) -> Self {
        Self::Custody(e.to_string())
    }
}

/// Map a chain failure that produced no mined transaction.
///
/// Mined reverts are handled by the caller, which records them first.
fn chain_failure(e: ChainError) -> FundsError {
    match e {
        ChainError::ConfirmationTimeout { tx_hash } => FundsError::ConfirmationTimeout { tx_hash },
        ChainError::Reverted { tx_hash } => FundsError::OnChainRevert {
            reason: format!("transaction {tx_hash} reverted"),
            tx_hash: Some(tx_hash),
        },
        ChainError::Rejected(reason) => FundsError::OnChainRevert {
            tx_hash: None,
            reason,
        },
        ChainError::InvalidKey(msg) => FundsError::Custody(msg),
        ChainError::InvalidAddress(msg) => FundsError::Internal(format!("invalid address {msg}")),
        ChainError::RpcUnavailable(msg)
        | ChainError::InvalidRpcUrl(msg)
        | ChainError::ContractError(msg) => FundsError::RpcUnavailable(msg),
    }
}

/// Result of a confirmed movement.
#[derive(Debug, Clone)]
pub struct MovementOutcome {
    pub account: UserAccount,
    pub record: TransactionRecord,
    pub decimals: u8,
}

impl MovementOutcome {
    /// Savings balance after the movement, in token units.
    pub fn savings_balance(&self) -> String {
        format_amount(self.account.savings_balance.value(), self.decimals)
    }
}

/// Settlement-asset balance of a user's Safe.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WalletBalance {
    pub wallet_address: String,
    /// Balance in token units
    pub balance: String,
    /// Balance in base units
    pub balance_raw: String,
    pub decimals: u8,
    pub symbol: String,
}

/// The movement being orchestrated.
#[derive(Debug, Clone, Copy)]
enum Movement {
    Send { to: Address },
    Invest,
    Withdraw,
}

impl Movement {
    fn kind(self) -> TransactionKind {
        match self {
            Self::Send { .. } => TransactionKind::SentFunds,
            Self::Invest => TransactionKind::Invested,
            Self::Withdraw => TransactionKind::Withdrawn,
        }
    }
}

pub struct FundMovement {
    ledger: Arc<dyn LedgerStore>,
    vault: Arc<KeyVault>,
    signer: Arc<dyn SignerAdapter>,
    wallets: Arc<dyn MultisigWallet>,
    operator_key: Arc<RawKey>,
    operator_address: Address,
    savings_vehicle: Address,
    network: NetworkConfig,
    currency: String,
}

impl FundMovement {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        vault: Arc<KeyVault>,
        signer: Arc<dyn SignerAdapter>,
        wallets: Arc<dyn MultisigWallet>,
        operator_key: Arc<RawKey>,
        operator_address: Address,
        savings_vehicle: Address,
        network: NetworkConfig,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            vault,
            signer,
            wallets,
            operator_key,
            operator_address,
            savings_vehicle,
            network,
            currency: currency.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn operator_address(&self) -> Address {
        self.operator_address
    }

    /// Settlement-asset decimals.
    pub async fn decimals(&self) -> Result<u8, FundsError> {
        self.signer.decimals().await.map_err(chain_failure)
    }

    /// Transfer from the user's Safe to an external address.
    pub async fn send(
        &self,
        user: &AuthenticatedUser,
        to: &str,
        amount: &str,
    ) -> Result<MovementOutcome, FundsError> {
        let to: Address = to
            .trim()
            .parse()
            .map_err(|_| FundsError::Validation("Invalid recipient address.".to_string()))?;
        if to == Address::ZERO {
            return Err(FundsError::Validation(
                "Cannot send to the zero address.".to_string(),
            ));
        }
        self.run(user, Movement::Send { to }, amount).await
    }

    /// Transfer from the user's Safe into the savings vehicle.
    pub async fn invest(
        &self,
        user: &AuthenticatedUser,
        amount: &str,
    ) -> Result<MovementOutcome, FundsError> {
        self.run(user, Movement::Invest, amount).await
    }

    /// Pay savings back to the user's Safe from the operator reserve.
    pub async fn withdraw(
        &self,
        user: &AuthenticatedUser,
        amount: &str,
    ) -> Result<MovementOutcome, FundsError> {
        self.run(user, Movement::Withdraw, amount).await
    }

    /// The caller's records, newest first.
    pub fn history(
        &self,
        user: &AuthenticatedUser,
        limit: Option<usize>,
    ) -> Result<Vec<TransactionRecord>, FundsError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.load_account(user)?;
        Ok(self.ledger.list_transactions(&user.account_id, limit)?)
    }

    /// Settlement-asset balance held by the caller's Safe.
    pub async fn wallet_balance(
        &self,
        user: &AuthenticatedUser,
    ) -> Result<WalletBalance, FundsError> {
        let account = self.load_account(user)?;
        let wallet = linked_wallet(&account)?;

        let balance = self.signer.balance_of(wallet).await.map_err(chain_failure)?;
        let decimals = self.decimals().await?;
        let symbol = self.signer.symbol().await.unwrap_or_else(|e| {
            warn!(error = %e, "Token symbol lookup failed, using configured currency");
            self.currency.clone()
        });

        Ok(WalletBalance {
            wallet_address: wallet.to_string(),
            balance: format_amount(balance, decimals),
            balance_raw: balance.to_string(),
            decimals,
            symbol,
        })
    }

    fn load_account(&self, user: &AuthenticatedUser) -> Result<UserAccount, FundsError> {
        self.ledger
            .get_account(&user.account_id)?
            .ok_or_else(|| FundsError::AccountNotFound(user.account_id.clone()))
    }

    async fn run(
        &self,
        user: &AuthenticatedUser,
        movement: Movement,
        amount_input: &str,
    ) -> Result<MovementOutcome, FundsError> {
        let amount_input = amount_input.trim();
        check_amount_format(amount_input).map_err(|e| FundsError::Validation(e.to_string()))?;
        let decimals = self.decimals().await?;
        let amount = parse_amount(amount_input, decimals)
            .map(TokenAmount::new)
            .map_err(|e| FundsError::Validation(e.to_string()))?;

        let account = self.load_account(user)?;
        if account.custody.is_empty() {
            return Err(FundsError::WalletNotProvisioned(account.id));
        }
        let wallet = linked_wallet(&account)?;
        let shown = format_amount(amount.value(), decimals);

        let token = self.signer.settlement_token();
        let (from, to) = match movement {
            Movement::Send { to } => (wallet, to),
            Movement::Invest => (wallet, self.savings_vehicle),
            Movement::Withdraw => (self.operator_address, wallet),
        };
        let call = transfer_call(token, to, amount.value());

        let submitted = match movement {
            Movement::Send { .. } | Movement::Invest => {
                self.ensure_wallet_funds(wallet, amount, decimals).await?;
                let owner_key = self.vault.reveal(&account.custody)?;
                self.wallets.execute(&owner_key, wallet, call).await
            }
            Movement::Withdraw => {
                if amount > account.savings_balance {
                    return Err(FundsError::Validation(format!(
                        "Insufficient savings: balance is {}, requested {shown}.",
                        format_amount(account.savings_balance.value(), decimals)
                    )));
                }
                self.ensure_reserve(amount, decimals).await?;
                self.signer.submit(&self.operator_key, call).await
            }
        };

        let kind = movement.kind();
        let receipt = match submitted {
            Ok(receipt) => receipt,
            Err(ChainError::Reverted { tx_hash }) => {
                self.record_failure(&account, kind, amount, from, to, &tx_hash, &shown);
                return Err(FundsError::OnChainRevert {
                    reason: format!("transaction {tx_hash} reverted"),
                    tx_hash: Some(tx_hash),
                });
            }
            Err(ChainError::ConfirmationTimeout { tx_hash }) => {
                error!(
                    account_id = %account.id,
                    kind = %kind,
                    amount = %shown,
                    tx_hash = %tx_hash,
                    "Transaction confirmation timed out, outcome unknown"
                );
                return Err(FundsError::ConfirmationTimeout { tx_hash });
            }
            Err(e) => return Err(chain_failure(e)),
        };

        self.commit(account, movement, amount, from, to, receipt, &shown, decimals)
    }

    /// Apply the confirmed movement to the ledger.
    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        account: UserAccount,
        movement: Movement,
        amount: TokenAmount,
        from: Address,
        to: Address,
        receipt: TxReceipt,
        shown: &str,
        decimals: u8,
    ) -> Result<MovementOutcome, FundsError> {
        let now = Utc::now();
        let kind = movement.kind();
        let patch = match movement {
            Movement::Send { .. } => AccountPatch::new(),
            Movement::Invest => AccountPatch::new().deposit(amount, now),
            Movement::Withdraw => AccountPatch::new().withdrawal(amount),
        }
        .touch(now);

        let record = TransactionRecord {
            id: Uuid::new_v4().to_string(),
            account_id: account.id.clone(),
            kind,
            amount,
            currency: self.currency.clone(),
            from_address: from.to_string(),
            to_address: to.to_string(),
            status: TransactionStatus::Success,
            tx_hash: receipt.tx_hash.clone(),
            explorer_url: self.network.tx_url(&receipt.tx_hash),
            timestamp: now,
            description: self.describe(movement, shown, to),
        };

        match self.ledger.commit_movement(&account.id, &patch, &record) {
            Ok(account) => {
                info!(
                    account_id = %account.id,
                    kind = %kind,
                    amount = %shown,
                    tx_hash = %receipt.tx_hash,
                    "Fund movement confirmed"
                );
                Ok(MovementOutcome {
                    account,
                    record,
                    decimals,
                })
            }
            Err(source) => {
                error!(
                    account_id = %account.id,
                    kind = %kind,
                    amount = %shown,
                    tx_hash = %receipt.tx_hash,
                    error = %source,
                    "CRITICAL: Transaction confirmed but ledger write failed, reconciliation required"
                );
                Err(FundsError::LedgerWriteFailed {
                    tx_hash: receipt.tx_hash,
                    account_id: account.id,
                    source,
                })
            }
        }
    }

    /// Append a failed record for a mined revert. Balances are untouched.
    #[allow(clippy::too_many_arguments)]
    fn record_failure(
        &self,
        account: &UserAccount,
        kind: TransactionKind,
        amount: TokenAmount,
        from: Address,
        to: Address,
        tx_hash: &str,
        shown: &str,
    ) {
        warn!(
            account_id = %account.id,
            kind = %kind,
            amount = %shown,
            tx_hash = %tx_hash,
            "Transaction reverted on-chain"
        );

        let record = TransactionRecord {
            id: Uuid::new_v4().to_string(),
            account_id: account.id.clone(),
            kind,
            amount,
            currency: self.currency.clone(),
            from_address: from.to_string(),
            to_address: to.to_string(),
            status: TransactionStatus::Failed,
            tx_hash: tx_hash.to_string(),
            explorer_url: self.network.tx_url(tx_hash),
            timestamp: Utc::now(),
            description: format!("{kind} of {shown} {} reverted.", self.currency),
        };
        if let Err(e) = self.ledger.append_transaction(&record) {
            error!(
                account_id = %account.id,
                tx_hash = %tx_hash,
                error = %e,
                "Failed to record reverted transaction"
            );
        }
    }

    fn describe(&self, movement: Movement, shown: &str, to: Address) -> String {
        let currency = &self.currency;
        match movement {
            Movement::Send { .. } => format!("Sent {shown} {currency} to {to}."),
            Movement::Invest => format!("Invested {shown} {currency} into savings."),
            Movement::Withdraw => format!("Withdrew {shown} {currency} from savings."),
        }
    }

    async fn ensure_wallet_funds(
        &self,
        wallet: Address,
        amount: TokenAmount,
        decimals: u8,
    ) -> Result<(), FundsError> {
        let available = self.signer.balance_of(wallet).await.map_err(chain_failure)?;
        if available < amount.value() {
            return Err(FundsError::Validation(format!(
                "Insufficient wallet balance: {} available.",
                format_amount(available, decimals)
            )));
        }
        Ok(())
    }

    /// Withdrawals are paid from the pooled reserve held by the operator.
    async fn ensure_reserve(&self, amount: TokenAmount, decimals: u8) -> Result<(), FundsError> {
        let reserve = self
            .signer
            .balance_of(self.operator_address)
            .await
            .map_err(chain_failure)?;
        if reserve < amount.value() {
            error!(
                reserve = %format_amount(reserve, decimals),
                requested = %format_amount(amount.value(), decimals),
                "Operator reserve cannot cover withdrawal"
            );
            return Err(FundsError::ReserveInsufficient {
                available: format_amount(reserve, decimals),
                requested: format_amount(amount.value(), decimals),
            });
        }
        Ok(())
    }
}

fn linked_wallet(account: &UserAccount) -> Result<Address, FundsError> {
    account
        .wallet_address
        .as_deref()
        .ok_or_else(|| FundsError::WalletNotProvisioned(account.id.clone()))?
        .parse()
        .map_err(|_| FundsError::Internal(format!("stored wallet of {} is invalid", account.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use crate::locks::AccountLocks;
    use crate::testing::{units, Harness, MockFailure};
    use std::time::Duration;

    #[tokio::test]
    async fn invest_then_overdraw_is_rejected() {
        let h = Harness::new().await;
        let (account, user) = h.provisioned_user("a@x.com").await;
        h.fund_wallet(&account, units(500));

        h.funds.invest(&user, "100").await.unwrap();
        let calls_before = h.chain.call_count();

        let err = h.funds.withdraw(&user, "150").await.unwrap_err();
        assert!(matches!(err, FundsError::Validation(_)));
        // No on-chain action was attempted
        assert_eq!(h.chain.call_count(), calls_before);

        let stored = h.ledger.get_account(&account.id).unwrap().unwrap();
        assert_eq!(stored.savings_balance, TokenAmount::new(units(100)));

        let history = h.ledger.list_transactions(&account.id, 50).unwrap();
        let invested: Vec<_> = history
            .iter()
            .filter(|r| r.kind != TransactionKind::WalletCreated)
            .collect();
        assert_eq!(invested.len(), 1);
        assert_eq!(invested[0].kind, TransactionKind::Invested);
    }

    #[tokio::test]
    async fn repeated_investments_keep_first_start_date() {
        let h = Harness::new().await;
        let (account, user) = h.provisioned_user("a@x.com").await;
        h.fund_wallet(&account, units(500));

        let first = h.funds.invest(&user, "50").await.unwrap();
        assert_eq!(
            first.account.savings_start_date,
            Some(first.record.timestamp)
        );
        let second = h.funds.invest(&user, "50").await.unwrap();

        let stored = h.ledger.get_account(&account.id).unwrap().unwrap();
        assert_eq!(stored.savings_balance, TokenAmount::new(units(100)));
        assert_eq!(stored.total_deposited, TokenAmount::new(units(100)));
        assert_eq!(stored.savings_start_date, Some(first.record.timestamp));
        assert_ne!(stored.savings_start_date, Some(second.record.timestamp));
        assert_eq!(second.savings_balance(), "100");

        let invested = h
            .ledger
            .list_transactions(&account.id, 50)
            .unwrap()
            .into_iter()
            .filter(|r| r.kind == TransactionKind::Invested)
            .count();
        assert_eq!(invested, 2);

        // Tokens reached the savings vehicle
        assert_eq!(h.chain.token_balance(h.vehicle), units(100));
    }

    #[tokio::test]
    async fn withdrawals_keep_balance_identity() {
        let h = Harness::new().await;
        let (account, user) = h.provisioned_user("a@x.com").await;
        h.fund_wallet(&account, units(1_000));
        h.funds.invest(&user, "300").await.unwrap();

        let mut expected_balance = units(300);
        let mut expected_withdrawn = U256::ZERO;
        for amount in ["0.5", "99.5", "1", "199"] {
            let before = h.ledger.get_account(&account.id).unwrap().unwrap();
            let outcome = h.funds.withdraw(&user, amount).await.unwrap();
            let delta = parse_amount(amount, 18).unwrap();
            expected_balance -= delta;
            expected_withdrawn += delta;

            assert_eq!(
                outcome.account.savings_balance.value(),
                before.savings_balance.value() - delta
            );
            assert_eq!(
                outcome.account.total_withdrawn.value(),
                before.total_withdrawn.value() + delta
            );
            assert_eq!(
                outcome.account.savings_balance.value(),
                outcome.account.total_deposited.value() - outcome.account.total_withdrawn.value()
            );
            assert_eq!(outcome.record.amount.value(), delta);
        }
        let stored = h.ledger.get_account(&account.id).unwrap().unwrap();
        assert_eq!(stored.savings_balance.value(), expected_balance);
        assert_eq!(stored.total_withdrawn.value(), expected_withdrawn);
        assert!(stored.savings_balance.is_zero());

        // Nothing left to withdraw
        assert!(matches!(
            h.funds.withdraw(&user, "0.000000000000000001").await,
            Err(FundsError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn send_moves_tokens_without_touching_savings() {
        let h = Harness::new().await;
        let (account, user) = h.provisioned_user("a@x.com").await;
        h.fund_wallet(&account, units(10));
        let recipient = Address::repeat_byte(0x77);

        let outcome = h
            .funds
            .send(&user, &recipient.to_string(), "2.5")
            .await
            .unwrap();
        assert_eq!(outcome.record.kind, TransactionKind::SentFunds);
        assert_eq!(outcome.record.to_address, recipient.to_string());
        assert!(outcome.account.savings_balance.is_zero());
        assert_eq!(h.chain.token_balance(recipient), parse_amount("2.5", 18).unwrap());
    }

    #[tokio::test]
    async fn input_validation() {
        let h = Harness::new().await;
        let (account, user) = h.provisioned_user("a@x.com").await;
        h.fund_wallet(&account, units(10));

        for bad in ["", "0", "-1", "1e3", "abc", "1.0000000000000000001"] {
            assert!(
                matches!(h.funds.invest(&user, bad).await, Err(FundsError::Validation(_))),
                "{bad} accepted"
            );
        }
        assert!(matches!(
            h.funds.send(&user, "0x1234", "1").await,
            Err(FundsError::Validation(_))
        ));
        assert!(matches!(
            h.funds.send(&user, &Address::ZERO.to_string(), "1").await,
            Err(FundsError::Validation(_))
        ));
        assert!(matches!(
            h.funds.invest(&user, "11").await,
            Err(FundsError::Validation(_))
        ));
        assert_eq!(h.ledger.list_transactions(&account.id, 50).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_amount_is_rejected_before_rpc() {
        let h = Harness::new().await;
        let (_, user) = h.provisioned_user("a@x.com").await;

        for bad in ["", "-5", "1e3", "ten"] {
            h.chain
                .fail_next(MockFailure::Decimals(ChainError::RpcUnavailable("down".into())));
            assert!(
                matches!(h.funds.invest(&user, bad).await, Err(FundsError::Validation(_))),
                "{bad} reached the RPC"
            );
            // The decimals read was never attempted
            assert!(matches!(
                h.funds.invest(&user, "1").await,
                Err(FundsError::RpcUnavailable(_))
            ));
        }
    }

    #[tokio::test]
    async fn unknown_and_unprovisioned_accounts() {
        let h = Harness::new().await;
        let ghost = AuthenticatedUser {
            account_id: "ghost".into(),
            expires_at: 0,
        };
        assert!(matches!(
            h.funds.invest(&ghost, "1").await,
            Err(FundsError::AccountNotFound(_))
        ));

        h.chain.fail_next(MockFailure::Deploy(ChainError::RpcUnavailable("down".into())));
        let (_, user) = h.signup("b@x.com").await;
        assert!(matches!(
            h.funds.invest(&user, "1").await,
            Err(FundsError::WalletNotProvisioned(_))
        ));
        assert!(matches!(
            h.funds.withdraw(&user, "1").await,
            Err(FundsError::WalletNotProvisioned(_))
        ));
    }

    #[tokio::test]
    async fn mined_revert_records_failure_only() {
        let h = Harness::new().await;
        let (account, user) = h.provisioned_user("a@x.com").await;
        h.fund_wallet(&account, units(10));
        h.chain.fail_next(MockFailure::Execute(ChainError::Reverted {
            tx_hash: "0xbad".into(),
        }));

        let err = h.funds.invest(&user, "5").await.unwrap_err();
        assert!(matches!(
            err,
            FundsError::OnChainRevert { tx_hash: Some(ref hash), .. } if hash == "0xbad"
        ));

        let stored = h.ledger.get_account(&account.id).unwrap().unwrap();
        assert!(stored.savings_balance.is_zero());
        let latest = &h.ledger.list_transactions(&account.id, 1).unwrap()[0];
        assert_eq!(latest.status, TransactionStatus::Failed);
        assert_eq!(latest.tx_hash, "0xbad");
    }

    #[tokio::test]
    async fn timeout_and_rpc_failures_leave_no_record() {
        let h = Harness::new().await;
        let (account, user) = h.provisioned_user("a@x.com").await;
        h.fund_wallet(&account, units(10));

        h.chain.fail_next(MockFailure::Execute(ChainError::ConfirmationTimeout {
            tx_hash: "0xslow".into(),
        }));
        assert!(matches!(
            h.funds.invest(&user, "1").await,
            Err(FundsError::ConfirmationTimeout { ref tx_hash }) if tx_hash == "0xslow"
        ));

        h.chain.fail_next(MockFailure::Execute(ChainError::RpcUnavailable("down".into())));
        assert!(matches!(
            h.funds.invest(&user, "1").await,
            Err(FundsError::RpcUnavailable(_))
        ));

        assert_eq!(h.ledger.list_transactions(&account.id, 50).unwrap().len(), 1);
        let stored = h.ledger.get_account(&account.id).unwrap().unwrap();
        assert!(stored.savings_balance.is_zero());
    }

    #[tokio::test]
    async fn withdraw_requires_reserve() {
        let h = Harness::new().await;
        let (account, user) = h.provisioned_user("a@x.com").await;
        h.fund_wallet(&account, units(100));
        h.funds.invest(&user, "100").await.unwrap();

        h.chain.set_token_balance(h.operator, units(10));
        let err = h.funds.withdraw(&user, "50").await.unwrap_err();
        assert!(matches!(err, FundsError::ReserveInsufficient { .. }));

        let stored = h.ledger.get_account(&account.id).unwrap().unwrap();
        assert_eq!(stored.savings_balance, TokenAmount::new(units(100)));
        assert_eq!(
            h.ledger
                .list_transactions(&account.id, 50)
                .unwrap()
                .iter()
                .filter(|r| r.kind == TransactionKind::Withdrawn)
                .count(),
            0
        );
    }

    #[tokio::test]
    async fn locked_concurrent_withdrawals_never_overdraw() {
        let h = Harness::new().await;
        let (account, user) = h.provisioned_user("a@x.com").await;
        h.fund_wallet(&account, units(100));
        h.funds.invest(&user, "100").await.unwrap();
        h.chain.set_delay(Duration::from_millis(20));

        let locks = Arc::new(AccountLocks::new());
        let mut handles = Vec::new();
        for _ in 0..3 {
            let funds = h.funds.clone();
            let locks = locks.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&user.account_id).await;
                funds.withdraw(&user, "40").await
            }));
        }

        let mut ok = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(FundsError::Validation(_)) => rejected += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!((ok, rejected), (2, 1));

        let stored = h.ledger.get_account(&account.id).unwrap().unwrap();
        assert_eq!(stored.savings_balance, TokenAmount::new(units(20)));
        assert_eq!(stored.total_withdrawn, TokenAmount::new(units(80)));
    }

    #[tokio::test]
    async fn unlocked_race_is_caught_by_ledger() {
        let h = Harness::new().await;
        let (account, user) = h.provisioned_user("a@x.com").await;
        h.fund_wallet(&account, units(100));
        h.funds.invest(&user, "100").await.unwrap();
        h.chain.set_delay(Duration::from_millis(20));

        let (a, b) = tokio::join!(
            h.funds.withdraw(&user, "60"),
            h.funds.withdraw(&user, "60")
        );
        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(FundsError::LedgerWriteFailed {
                source: LedgerError::InsufficientSavings { .. },
                ..
            })
        )));

        let stored = h.ledger.get_account(&account.id).unwrap().unwrap();
        assert_eq!(stored.savings_balance, TokenAmount::new(units(40)));
    }

    #[tokio::test]
    async fn history_and_wallet_balance() {
        let h = Harness::new().await;
        let (account, user) = h.provisioned_user("a@x.com").await;
        h.fund_wallet(&account, units(10));
        h.funds.invest(&user, "1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        h.funds.invest(&user, "2").await.unwrap();

        let history = h.funds.history(&user, Some(2)).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].amount, TokenAmount::new(units(2)));
        assert!(history[0].timestamp >= history[1].timestamp);

        let balance = h.funds.wallet_balance(&user).await.unwrap();
        assert_eq!(balance.balance, "7");
        assert_eq!(balance.decimals, 18);
        assert_eq!(balance.wallet_address, account.wallet_address.unwrap());
    }

    #[test]
    fn chain_errors_map_to_taxonomy() {
        assert!(matches!(
            chain_failure(ChainError::Rejected("insufficient funds".into())),
            FundsError::OnChainRevert { tx_hash: None, .. }
        ));
        assert!(matches!(
            chain_failure(ChainError::ContractError("x".into())),
            FundsError::RpcUnavailable(_)
        ));
        assert!(matches!(
            chain_failure(ChainError::InvalidKey("x".into())),
            FundsError::Custody(_)
        ));
    }
}
