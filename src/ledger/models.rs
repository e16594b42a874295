// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger documents: user accounts, transaction records and account patches.

use std::fmt;

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

use super::LedgerError;
use crate::custody::CustodyRecord;

// =============================================================================
// TokenAmount
// =============================================================================

/// Settlement-asset amount in base units.
///
/// Serialized as a decimal string so no precision is lost in storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(U256);

impl TokenAmount {
    pub const ZERO: Self = Self(U256::ZERO);

    pub fn new(value: U256) -> Self {
        Self(value)
    }

    pub fn value(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        U256::from_str_radix(&s, 10)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// UserAccount
// =============================================================================

/// Identity, custody reference and savings balances of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Unique account identifier (UUID)
    pub id: String,
    /// Display name
    pub name: String,
    /// Lowercased, unique email
    pub email: String,
    /// PBKDF2 password hash
    pub password_hash: String,
    /// EOA address of the owner key
    pub owner_address: String,
    /// Encrypted owner key (`nonce:ciphertext`)
    pub custody: CustodyRecord,
    /// Safe address, set once deployment is confirmed
    #[serde(default)]
    pub wallet_address: Option<String>,
    /// CREATE2 salt nonce used for the Safe
    pub wallet_salt: u64,
    /// Deployment broadcast whose receipt was never seen
    #[serde(default)]
    pub unconfirmed_deployment_tx: Option<String>,
    pub savings_balance: TokenAmount,
    pub total_deposited: TokenAmount,
    pub total_withdrawn: TokenAmount,
    /// Timestamp of the first deposit
    #[serde(default)]
    pub savings_start_date: Option<DateTime<Utc>>,
    /// Whether the owner EOA has received its gas allowance
    #[serde(default)]
    pub gas_funded: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UserAccount {
    /// Apply a patch, enforcing wallet immutability and non-negative savings.
    pub fn apply(&mut self, patch: &AccountPatch) -> Result<(), LedgerError> {
        if let Some(wallet) = &patch.wallet_address {
            match &self.wallet_address {
                Some(existing) if existing.eq_ignore_ascii_case(wallet) => {}
                Some(_) => return Err(LedgerError::WalletAlreadyLinked(self.id.clone())),
                None => self.wallet_address = Some(wallet.clone()),
            }
        }

        match patch.balance {
            Some(BalanceChange::Deposit { amount, at }) => {
                self.savings_balance = self
                    .savings_balance
                    .checked_add(amount)
                    .ok_or(LedgerError::Overflow)?;
                self.total_deposited = self
                    .total_deposited
                    .checked_add(amount)
                    .ok_or(LedgerError::Overflow)?;
                if self.savings_start_date.is_none() {
                    self.savings_start_date = Some(at);
                }
            }
            Some(BalanceChange::Withdrawal { amount }) => {
                self.savings_balance = self.savings_balance.checked_sub(amount).ok_or_else(|| {
                    LedgerError::InsufficientSavings {
                        account_id: self.id.clone(),
                        balance: self.savings_balance,
                        requested: amount,
                    }
                })?;
                self.total_withdrawn = self
                    .total_withdrawn
                    .checked_add(amount)
                    .ok_or(LedgerError::Overflow)?;
            }
            None => {}
        }

        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(tx_hash) = &patch.unconfirmed_deployment_tx {
            self.unconfirmed_deployment_tx = Some(tx_hash.clone());
        }
        if let Some(gas_funded) = patch.gas_funded {
            self.gas_funded = gas_funded;
        }
        if let Some(at) = patch.last_activity {
            self.last_activity = at;
        }
        Ok(())
    }
}

/// Savings balance movement carried by a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceChange {
    Deposit { amount: TokenAmount, at: DateTime<Utc> },
    Withdrawal { amount: TokenAmount },
}

/// Partial update to a [`UserAccount`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub wallet_address: Option<String>,
    pub unconfirmed_deployment_tx: Option<String>,
    pub gas_funded: Option<bool>,
    pub balance: Option<BalanceChange>,
    pub last_activity: Option<DateTime<Utc>>,
}

impl AccountPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn wallet_address(mut self, address: impl Into<String>) -> Self {
        self.wallet_address = Some(address.into());
        self
    }

    pub fn unconfirmed_deployment_tx(mut self, tx_hash: impl Into<String>) -> Self {
        self.unconfirmed_deployment_tx = Some(tx_hash.into());
        self
    }

    pub fn gas_funded(mut self, funded: bool) -> Self {
        self.gas_funded = Some(funded);
        self
    }

    pub fn deposit(mut self, amount: TokenAmount, at: DateTime<Utc>) -> Self {
        self.balance = Some(BalanceChange::Deposit { amount, at });
        self
    }

    pub fn withdrawal(mut self, amount: TokenAmount) -> Self {
        self.balance = Some(BalanceChange::Withdrawal { amount });
        self
    }

    pub fn touch(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity = Some(at);
        self
    }
}

// =============================================================================
// TransactionRecord
// =============================================================================

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    WalletCreated,
    SentFunds,
    Invested,
    Withdrawn,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WalletCreated => "wallet_created",
            Self::SentFunds => "sent_funds",
            Self::Invested => "invested",
            Self::Withdrawn => "withdrawn",
        };
        f.write_str(s)
    }
}

/// Outcome of the on-chain action behind a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
}

/// Immutable, append-only history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique record identifier (UUID)
    pub id: String,
    pub account_id: String,
    pub kind: TransactionKind,
    /// Amount in base units (zero for wallet creation)
    pub amount: TokenAmount,
    pub currency: String,
    pub from_address: String,
    pub to_address: String,
    pub status: TransactionStatus,
    pub tx_hash: String,
    pub explorer_url: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> UserAccount {
        let now = Utc::now();
        UserAccount {
            id: "acc-1".into(),
            name: "Ada".into(),
            email: "a@x.com".into(),
            password_hash: "hash".into(),
            owner_address: "0x01".into(),
            custody: CustodyRecord::new("00:11"),
            wallet_address: None,
            wallet_salt: 1,
            unconfirmed_deployment_tx: None,
            savings_balance: TokenAmount::ZERO,
            total_deposited: TokenAmount::ZERO,
            total_withdrawn: TokenAmount::ZERO,
            savings_start_date: None,
            gas_funded: false,
            created_at: now,
            last_activity: now,
        }
    }

    #[test]
    fn token_amount_serializes_as_decimal_string() {
        let amount = TokenAmount::from(U256::from(10u64).pow(U256::from(20u64)));
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"100000000000000000000\"");
        let back: TokenAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
        assert!(serde_json::from_str::<TokenAmount>("\"-1\"").is_err());
    }

    #[test]
    fn deposit_sets_start_date_once() {
        let mut acc = account();
        let first = Utc::now();
        let second = first + chrono::Duration::seconds(5);

        acc.apply(&AccountPatch::new().deposit(50u64.into(), first))
            .unwrap();
        acc.apply(&AccountPatch::new().deposit(50u64.into(), second))
            .unwrap();

        assert_eq!(acc.savings_balance, 100u64.into());
        assert_eq!(acc.total_deposited, 100u64.into());
        assert_eq!(acc.savings_start_date, Some(first));
    }

    #[test]
    fn withdrawal_cannot_go_negative() {
        let mut acc = account();
        acc.apply(&AccountPatch::new().deposit(100u64.into(), Utc::now()))
            .unwrap();

        let err = acc
            .apply(&AccountPatch::new().withdrawal(150u64.into()))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientSavings { .. }));
        assert_eq!(acc.savings_balance, 100u64.into());
        assert_eq!(acc.total_withdrawn, TokenAmount::ZERO);

        acc.apply(&AccountPatch::new().withdrawal(40u64.into()))
            .unwrap();
        assert_eq!(acc.savings_balance, 60u64.into());
        assert_eq!(
            acc.savings_balance,
            acc.total_deposited.checked_sub(acc.total_withdrawn).unwrap()
        );
    }

    #[test]
    fn wallet_address_is_immutable_once_set() {
        let mut acc = account();
        acc.apply(&AccountPatch::new().wallet_address("0xAbC")).unwrap();
        // Same address in a different case is a no-op
        acc.apply(&AccountPatch::new().wallet_address("0xabc")).unwrap();

        let err = acc
            .apply(&AccountPatch::new().wallet_address("0xdef"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::WalletAlreadyLinked(_)));
        assert_eq!(acc.wallet_address.as_deref(), Some("0xAbC"));
    }
}
