// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Maintenance Worker
//!
//! Background task that keeps provisioned accounts and the withdrawal
//! reserve in shape.
//!
//! ## Strategy
//!
//! Every `interval` (default 300 s) the worker:
//! 1. Retries gas funding for accounts with a linked wallet whose owner EOA
//!    was never funded.
//! 2. Compares the operator's settlement-asset balance with the sum of all
//!    savings balances and logs at `error!` when the reserve is short.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::blockchain::SignerAdapter;
use crate::ledger::LedgerStore;
use crate::provisioning::ProvisioningSaga;

/// Default interval between sweeps.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub gas_funded: usize,
    pub gas_failures: usize,
    /// Sum of all savings balances in base units
    pub liabilities: U256,
    /// Operator balance, if it could be read
    pub reserve: Option<U256>,
}

impl SweepReport {
    /// Whether the reserve covers every savings balance. `None` when unknown.
    pub fn solvent(&self) -> Option<bool> {
        self.reserve.map(|reserve| reserve >= self.liabilities)
    }
}

pub struct MaintenanceWorker {
    ledger: Arc<dyn LedgerStore>,
    provisioning: Arc<ProvisioningSaga>,
    signer: Arc<dyn SignerAdapter>,
    operator_address: Address,
    interval: Duration,
}

impl MaintenanceWorker {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        provisioning: Arc<ProvisioningSaga>,
        signer: Arc<dyn SignerAdapter>,
        operator_address: Address,
    ) -> Self {
        Self {
            ledger,
            provisioning,
            signer,
            operator_address,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run sweeps until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(worker.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Maintenance worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Maintenance worker shutting down");
                return;
            }

            self.sweep().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Maintenance worker shutting down");
                    return;
                }
            }
        }
    }

    /// Execute one sweep.
    pub async fn sweep(&self) -> SweepReport {
        let accounts = match self.ledger.list_accounts() {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(error = %e, "Maintenance: failed to list accounts");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport::default();

        for account in accounts.iter().filter(|a| a.wallet_address.is_some() && !a.gas_funded) {
            // Takes the account lock and re-reads the account
            match self.provisioning.fund_gas(&account.id).await {
                Ok(Some(funding)) => {
                    info!(
                        account_id = %funding.account_id,
                        tx_hash = %funding.tx_hash,
                        "Maintenance: gas funding retried"
                    );
                    report.gas_funded += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(account_id = %account.id, error = %e, "Maintenance: gas funding still failing");
                    report.gas_failures += 1;
                }
            }
        }

        report.liabilities = accounts
            .iter()
            .fold(U256::ZERO, |sum, a| sum.saturating_add(a.savings_balance.value()));

        match self.signer.balance_of(self.operator_address).await {
            Ok(reserve) => {
                report.reserve = Some(reserve);
                if reserve < report.liabilities {
                    error!(
                        operator = %self.operator_address,
                        reserve = %reserve,
                        liabilities = %report.liabilities,
                        shortfall = %(report.liabilities - reserve),
                        "CRITICAL: Withdrawal reserve does not cover savings balances"
                    );
                }
            }
            Err(e) => warn!(error = %e, "Maintenance: failed to read reserve balance"),
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::ChainError;
    use crate::provisioning::{ProvisioningState, SignupRequest};
    use crate::testing::{units, Harness, MockFailure};

    fn worker(h: &Harness) -> MaintenanceWorker {
        MaintenanceWorker::new(
            h.ledger.clone(),
            h.saga.clone(),
            h.chain.clone(),
            h.operator,
        )
    }

    #[tokio::test]
    async fn sweep_retries_gas_funding() {
        let h = Harness::new().await;
        h.chain.fail_next(MockFailure::Submit(ChainError::RpcUnavailable("down".into())));
        let (account, _) = h.provisioned_user("a@x.com").await;
        assert!(!account.gas_funded);

        let report = worker(&h).sweep().await;
        assert_eq!(report.gas_funded, 1);
        assert_eq!(report.gas_failures, 0);
        assert!(h.ledger.get_account(&account.id).unwrap().unwrap().gas_funded);

        // Nothing left to do
        assert_eq!(worker(&h).sweep().await.gas_funded, 0);
    }

    #[tokio::test]
    async fn sweep_does_not_refund_signup_in_flight() {
        let h = Harness::new().await;
        h.chain.set_delay(Duration::from_millis(200));

        let saga = h.saga.clone();
        let signup = tokio::spawn(async move {
            saga.signup(SignupRequest {
                name: "Ada".into(),
                email: "a@x.com".into(),
                password: "secret".into(),
            })
            .await
        });

        // Wait until the wallet is linked and gas is on its way
        let mut linked = None;
        for _ in 0..200 {
            linked = h
                .ledger
                .list_accounts()
                .unwrap()
                .into_iter()
                .find(|a| a.wallet_address.is_some());
            if linked.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let account = linked.expect("wallet linked during sign-up");
        assert!(!account.gas_funded);

        let report = worker(&h).sweep().await;
        let signed_up = signup.await.unwrap().unwrap();

        assert_eq!(signed_up.state, ProvisioningState::GasFunded);
        assert_eq!(report.gas_funded, 0);
        assert_eq!(report.gas_failures, 0);
        let owner: Address = account.owner_address.parse().unwrap();
        assert_eq!(h.chain.native_balance(owner), h.gas_amount);
    }

    #[tokio::test]
    async fn sweep_reports_reserve_shortfall() {
        let h = Harness::new().await;
        let (account, user) = h.provisioned_user("a@x.com").await;
        h.fund_wallet(&account, units(100));
        h.funds.invest(&user, "80").await.unwrap();

        let report = worker(&h).sweep().await;
        assert_eq!(report.liabilities, units(80));
        assert_eq!(report.solvent(), Some(true));

        h.chain.set_token_balance(h.operator, units(50));
        assert_eq!(worker(&h).sweep().await.solvent(), Some(false));

        h.chain.fail_next(MockFailure::Balance(ChainError::RpcUnavailable("down".into())));
        assert_eq!(worker(&h).sweep().await.solvent(), None);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let h = Harness::new().await;
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            worker(&h)
                .with_interval(Duration::from_secs(3600))
                .run(shutdown.clone()),
        );
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
