// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provisioning state machine.

use serde::Serialize;
use utoipa::ToSchema;

use crate::ledger::UserAccount;

/// Forward-only provisioning states.
///
/// ```text
/// KeyGenerated → WalletPredicted → WalletDeployed → LedgerLinked → GasFunded
///                       └──────────────┴─→ AccountCreatedDegraded
/// ```
///
/// There is no rollback: a deployed Safe cannot be undone, so a failed
/// deployment ends in the degraded state with the identity kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    KeyGenerated,
    WalletPredicted,
    WalletDeployed,
    LedgerLinked,
    GasFunded,
    AccountCreatedDegraded,
}

impl ProvisioningState {
    /// State a persisted account has settled in.
    ///
    /// Intermediate states are never persisted; an account without a linked
    /// wallet is degraded until resumed.
    pub fn of(account: &UserAccount) -> Self {
        match (&account.wallet_address, account.gas_funded) {
            (None, _) => Self::AccountCreatedDegraded,
            (Some(_), false) => Self::LedgerLinked,
            (Some(_), true) => Self::GasFunded,
        }
    }

    /// Whether funds can move for an account in this state.
    pub fn can_transact(self) -> bool {
        matches!(self, Self::LedgerLinked | Self::GasFunded)
    }

    /// Whether the saga stops here.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::LedgerLinked | Self::GasFunded | Self::AccountCreatedDegraded
        )
    }
}

impl std::fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::KeyGenerated => "key_generated",
            Self::WalletPredicted => "wallet_predicted",
            Self::WalletDeployed => "wallet_deployed",
            Self::LedgerLinked => "ledger_linked",
            Self::GasFunded => "gas_funded",
            Self::AccountCreatedDegraded => "account_created_degraded",
        };
        f.write_str(s)
    }
}
