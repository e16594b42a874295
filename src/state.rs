// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::SessionManager;
use crate::blockchain::SignerAdapter;
use crate::funds::FundMovement;
use crate::ledger::LedgerStore;
use crate::locks::AccountLocks;
use crate::providers::monerium::MoneriumClient;
use crate::provisioning::ProvisioningSaga;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub provisioning: Arc<ProvisioningSaga>,
    pub funds: Arc<FundMovement>,
    pub sessions: Arc<SessionManager>,
    pub locks: Arc<AccountLocks>,
    /// Chain access for readiness checks
    pub signer: Arc<dyn SignerAdapter>,
    /// Absent when Monerium credentials are not configured
    pub monerium: Option<Arc<MoneriumClient>>,
    /// Mark the session cookie `Secure`
    pub secure_cookies: bool,
}
