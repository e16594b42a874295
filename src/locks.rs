// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-account advisory locks.
//!
//! Balance-changing requests for one account run one at a time; requests for
//! different accounts never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct AccountLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `account_id`.
    ///
    /// The guard releases the lock when dropped.
    pub async fn lock(&self, account_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on
            map.retain(|id, m| id == account_id || Arc::strong_count(m) > 1);
            map.entry(account_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }

    /// Number of tracked accounts.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
