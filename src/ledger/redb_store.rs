// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded ledger backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `accounts`: account_id → serialized UserAccount
//! - `email_index`: lowercase email → account_id
//! - `transactions`: record_id → serialized TransactionRecord
//! - `account_tx_index`: composite key (account_id|!timestamp|record_id) → kind

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};

use super::models::{AccountPatch, TransactionRecord, UserAccount};
use super::{LedgerError, LedgerResult, LedgerStore};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: account_id → serialized UserAccount (JSON bytes).
const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

/// Unique index: lowercase email → account_id.
const EMAIL_INDEX: TableDefinition<&str, &str> = TableDefinition::new("email_index");

/// Append-only table: record_id → serialized TransactionRecord (JSON bytes).
const TRANSACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");

/// Index: `account_id|!timestamp_be|record_id` → kind, for newest-first scans.
const ACCOUNT_TX_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("account_tx_index");

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key for the account_tx_index table.
///
/// The inverted microsecond timestamp gives newest-first ordering when
/// scanning forward.
fn make_index_key(account_id: &str, timestamp_micros: i64, record_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(account_id.len() + 1 + 8 + 1 + record_id.len());
    key.extend_from_slice(account_id.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!timestamp_micros as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(record_id.as_bytes());
    key
}

fn make_prefix(account_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(account_id.len() + 1);
    prefix.extend_from_slice(account_id.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Upper bound for a range scan over one account's entries.
fn make_prefix_end(account_id: &str) -> Vec<u8> {
    let mut end = make_prefix(account_id);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

/// Record id is everything after the second separator.
fn extract_record_id(key: &[u8], prefix_len: usize) -> Option<String> {
    let rest = key.get(prefix_len + 8 + 1..)?;
    String::from_utf8(rest.to_vec()).ok()
}

// =============================================================================
// RedbLedger
// =============================================================================

/// Embedded ACID ledger.
pub struct RedbLedger {
    db: Database,
}

impl RedbLedger {
    /// Open (or create) the ledger at the given path.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(EMAIL_INDEX)?;
            let _ = write_txn.open_table(TRANSACTIONS)?;
            let _ = write_txn.open_table(ACCOUNT_TX_INDEX)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Load, patch and store an account inside an open write transaction.
    fn patch_in(
        write_txn: &WriteTransaction,
        account_id: &str,
        patch: &AccountPatch,
    ) -> LedgerResult<UserAccount> {
        let mut table = write_txn.open_table(ACCOUNTS)?;

        let existing_bytes = {
            let existing = table
                .get(account_id)?
                .ok_or_else(|| LedgerError::NotFound(format!("Account {account_id}")))?;
            existing.value().to_vec()
        };

        let mut account: UserAccount = serde_json::from_slice(&existing_bytes)?;
        account.apply(patch)?;

        let json = serde_json::to_vec(&account)?;
        table.insert(account_id, json.as_slice())?;
        Ok(account)
    }

    fn append_in(write_txn: &WriteTransaction, record: &TransactionRecord) -> LedgerResult<()> {
        let json = serde_json::to_vec(record)?;

        let mut tx_table = write_txn.open_table(TRANSACTIONS)?;
        if tx_table.get(record.id.as_str())?.is_some() {
            return Err(LedgerError::DuplicateRecord(record.id.clone()));
        }
        tx_table.insert(record.id.as_str(), json.as_slice())?;

        let mut idx_table = write_txn.open_table(ACCOUNT_TX_INDEX)?;
        let key = make_index_key(
            &record.account_id,
            record.timestamp.timestamp_micros(),
            &record.id,
        );
        let kind = record.kind.to_string();
        idx_table.insert(key.as_slice(), kind.as_str())?;
        Ok(())
    }
}

impl LedgerStore for RedbLedger {
    fn get_account(&self, account_id: &str) -> LedgerResult<Option<UserAccount>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        match table.get(account_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn find_account_by_email(&self, email: &str) -> LedgerResult<Option<UserAccount>> {
        let email = email.to_lowercase();
        let account_id = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(EMAIL_INDEX)?;
            match table.get(email.as_str())? {
                Some(v) => v.value().to_string(),
                None => return Ok(None),
            }
        };
        self.get_account(&account_id)
    }

    fn create_account(&self, account: &UserAccount) -> LedgerResult<()> {
        let email = account.email.to_lowercase();
        let json = serde_json::to_vec(account)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut email_table = write_txn.open_table(EMAIL_INDEX)?;
            if email_table.get(email.as_str())?.is_some() {
                return Err(LedgerError::EmailTaken(email));
            }
            email_table.insert(email.as_str(), account.id.as_str())?;

            let mut table = write_txn.open_table(ACCOUNTS)?;
            table.insert(account.id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn patch_account(&self, account_id: &str, patch: &AccountPatch) -> LedgerResult<UserAccount> {
        let write_txn = self.db.begin_write()?;
        let account = Self::patch_in(&write_txn, account_id, patch)?;
        write_txn.commit()?;
        Ok(account)
    }

    fn commit_movement(
        &self,
        account_id: &str,
        patch: &AccountPatch,
        record: &TransactionRecord,
    ) -> LedgerResult<UserAccount> {
        let write_txn = self.db.begin_write()?;
        let account = Self::patch_in(&write_txn, account_id, patch)?;
        Self::append_in(&write_txn, record)?;
        write_txn.commit()?;
        Ok(account)
    }

    fn append_transaction(&self, record: &TransactionRecord) -> LedgerResult<()> {
        let write_txn = self.db.begin_write()?;
        Self::append_in(&write_txn, record)?;
        write_txn.commit()?;
        Ok(())
    }

    fn list_transactions(
        &self,
        account_id: &str,
        limit: usize,
    ) -> LedgerResult<Vec<TransactionRecord>> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(ACCOUNT_TX_INDEX)?;
        let tx_table = read_txn.open_table(TRANSACTIONS)?;

        let prefix = make_prefix(account_id);
        let prefix_end = make_prefix_end(account_id);

        let mut results = Vec::with_capacity(limit.min(64));
        for entry in idx_table.range(prefix.as_slice()..prefix_end.as_slice())? {
            if results.len() >= limit {
                break;
            }
            let (key, _kind) = entry?;
            let Some(record_id) = extract_record_id(key.value(), prefix.len()) else {
                continue;
            };
            if let Some(value) = tx_table.get(record_id.as_str())? {
                results.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(results)
    }

    fn list_accounts(&self) -> LedgerResult<Vec<UserAccount>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        let mut accounts = Vec::new();
        for entry in table.iter()? {
            let (_id, value) = entry?;
            accounts.push(serde_json::from_slice(value.value())?);
        }
        Ok(accounts)
    }

    fn health_check(&self) -> LedgerResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(ACCOUNTS)?;
        Ok(())
    }
}
