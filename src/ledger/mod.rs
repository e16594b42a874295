// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger Store
//!
//! Authoritative off-chain record of user accounts, savings balances and
//! transaction history.
//!
//! The orchestration layer only depends on the [`LedgerStore`] trait. Writes
//! are serialized per document by the store; the balance check that guards a
//! withdrawal is re-evaluated inside the write transaction, so a withdrawal
//! that would take savings below zero is rejected even if two requests race.

pub mod models;
pub mod redb_store;

pub use models::{
    AccountPatch, BalanceChange, TokenAmount, TransactionKind, TransactionRecord,
    TransactionStatus, UserAccount,
};
pub use redb_store::RedbLedger;

/// Errors from the ledger store.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("ledger directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("email already registered: {0}")]
    EmailTaken(String),

    #[error("account {0} already has a different wallet linked")]
    WalletAlreadyLinked(String),

    #[error("account {account_id} has savings {balance}, cannot withdraw {requested}")]
    InsufficientSavings {
        account_id: String,
        balance: TokenAmount,
        requested: TokenAmount,
    },

    #[error("duplicate transaction record: {0}")]
    DuplicateRecord(String),

    #[error("balance overflow")]
    Overflow,
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Document-store contract consumed by provisioning and fund movement.
pub trait LedgerStore: Send + Sync {
    /// Look up an account by id.
    fn get_account(&self, account_id: &str) -> LedgerResult<Option<UserAccount>>;

    /// Look up an account by (case-insensitive) email.
    fn find_account_by_email(&self, email: &str) -> LedgerResult<Option<UserAccount>>;

    /// Insert a new account. Fails with `EmailTaken` if the email exists.
    fn create_account(&self, account: &UserAccount) -> LedgerResult<()>;

    /// Apply `patch` and return the updated account.
    fn patch_account(&self, account_id: &str, patch: &AccountPatch) -> LedgerResult<UserAccount>;

    /// Apply `patch` and append `record` in one atomic write.
    fn commit_movement(
        &self,
        account_id: &str,
        patch: &AccountPatch,
        record: &TransactionRecord,
    ) -> LedgerResult<UserAccount>;

    /// Append a record that changes no balance (e.g. a failed attempt).
    fn append_transaction(&self, record: &TransactionRecord) -> LedgerResult<()>;

    /// Records of one account, newest first.
    fn list_transactions(
        &self,
        account_id: &str,
        limit: usize,
    ) -> LedgerResult<Vec<TransactionRecord>>;

    /// Every account (maintenance sweeps).
    fn list_accounts(&self) -> LedgerResult<Vec<UserAccount>>;

    /// Verify the store is readable.
    fn health_check(&self) -> LedgerResult<()>;
}
