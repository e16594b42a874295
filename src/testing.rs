// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process chain and wiring for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use crate::auth::{AuthenticatedUser, SessionManager};
use crate::blockchain::erc20::IERC20;
use crate::blockchain::safe::{predict_safe_address, safe_initializer};
use crate::blockchain::signing::signer_from_key;
use crate::blockchain::{
    ChainCall, ChainError, ChainResult, MultisigWallet, SafeContracts, SignerAdapter, TxReceipt,
    WalletDeployment, WalletFactory, SAFE_V141_SEPOLIA, SEPOLIA,
};
use crate::custody::{KeyVault, RawKey};
use crate::funds::FundMovement;
use crate::ledger::{LedgerStore, RedbLedger, UserAccount};
use crate::locks::AccountLocks;
use crate::provisioning::{ProvisioningSaga, SignupRequest};
use crate::state::AppState;

/// Hardhat account #0.
pub const OPERATOR_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const SESSION_SECRET: &[u8] = b"test-session-secret";

/// Stand-in for the factory's proxy creation code.
const MOCK_CREATION_CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52];

/// `n` whole tokens at 18 decimals.
pub fn units(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

/// Failure injected into the next matching mock call.
#[derive(Debug, Clone)]
pub enum MockFailure {
    Submit(ChainError),
    Deploy(ChainError),
    Execute(ChainError),
    Balance(ChainError),
    Decimals(ChainError),
}

#[derive(Default)]
struct MockState {
    token_balances: HashMap<Address, U256>,
    native_balances: HashMap<Address, U256>,
    /// Safe address to owner
    wallets: HashMap<Address, Address>,
    failures: VecDeque<MockFailure>,
    delay: Option<Duration>,
    calls: usize,
    deploys: usize,
    tx_counter: u64,
}

impl MockState {
    fn next_hash(&mut self) -> String {
        self.tx_counter += 1;
        format!("0x{:064x}", self.tx_counter)
    }

    fn receipt(&mut self) -> TxReceipt {
        TxReceipt {
            tx_hash: self.next_hash(),
            block_number: Some(self.tx_counter),
            gas_used: 21_000,
        }
    }

    fn take_failure(&mut self, matches: impl Fn(&MockFailure) -> bool) -> Option<ChainError> {
        let index = self.failures.iter().position(matches)?;
        self.failures.remove(index).map(|f| match f {
            MockFailure::Submit(e)
            | MockFailure::Deploy(e)
            | MockFailure::Execute(e)
            | MockFailure::Balance(e)
            | MockFailure::Decimals(e) => e,
        })
    }

    fn transfer_token(&mut self, from: Address, call: &ChainCall) -> ChainResult<()> {
        let transfer = IERC20::transferCall::abi_decode(&call.data)
            .map_err(|e| ChainError::ContractError(e.to_string()))?;
        let available = self.token_balances.get(&from).copied().unwrap_or_default();
        if available < transfer.amount {
            let tx_hash = self.next_hash();
            return Err(ChainError::Reverted { tx_hash });
        }
        self.token_balances.insert(from, available - transfer.amount);
        *self.token_balances.entry(transfer.to).or_default() += transfer.amount;
        Ok(())
    }
}

/// Chain double implementing every chain seam over in-memory balances.
pub struct MockChain {
    contracts: SafeContracts,
    token: Address,
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new(token: Address) -> Self {
        Self {
            contracts: SafeContracts::from_deployment(&SAFE_V141_SEPOLIA)
                .expect("static Safe addresses"),
            token,
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    async fn pause(&self) {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn fail_next(&self, failure: MockFailure) {
        self.state().failures.push_back(failure);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    pub fn set_token_balance(&self, owner: Address, amount: U256) {
        self.state().token_balances.insert(owner, amount);
    }

    pub fn token_balance(&self, owner: Address) -> U256 {
        self.state()
            .token_balances
            .get(&owner)
            .copied()
            .unwrap_or_default()
    }

    pub fn native_balance(&self, owner: Address) -> U256 {
        self.state()
            .native_balances
            .get(&owner)
            .copied()
            .unwrap_or_default()
    }

    /// Submitted and executed transactions so far.
    pub fn call_count(&self) -> usize {
        self.state().calls
    }

    pub fn deploy_count(&self) -> usize {
        self.state().deploys
    }

    pub fn predict_sync(&self, owner: Address, salt: U256) -> Address {
        let initializer = safe_initializer(owner, self.contracts.fallback_handler);
        predict_safe_address(&self.contracts, MOCK_CREATION_CODE, &initializer, salt)
    }

    pub fn is_deployed_sync(&self, wallet: Address) -> bool {
        self.state().wallets.contains_key(&wallet)
    }

    /// Deploy without going through the factory seam (a receipt that was lost).
    pub fn force_deploy(&self, owner: Address, salt: U256) -> Address {
        let address = self.predict_sync(owner, salt);
        self.state().wallets.insert(address, owner);
        address
    }
}

#[async_trait]
impl SignerAdapter for MockChain {
    async fn submit(&self, key: &RawKey, call: ChainCall) -> ChainResult<TxReceipt> {
        self.pause().await;
        let sender = signer_from_key(key)?.address();
        let mut state = self.state();
        if let Some(e) = state.take_failure(|f| matches!(f, MockFailure::Submit(_))) {
            return Err(e);
        }
        state.calls += 1;

        if call.to == self.token {
            state.transfer_token(sender, &call)?;
        } else if call.data.is_empty() {
            *state.native_balances.entry(call.to).or_default() += call.value;
        }
        Ok(state.receipt())
    }

    async fn balance_of(&self, owner: Address) -> ChainResult<U256> {
        let mut state = self.state();
        if let Some(e) = state.take_failure(|f| matches!(f, MockFailure::Balance(_))) {
            return Err(e);
        }
        Ok(state.token_balances.get(&owner).copied().unwrap_or_default())
    }

    async fn decimals(&self) -> ChainResult<u8> {
        let mut state = self.state();
        if let Some(e) = state.take_failure(|f| matches!(f, MockFailure::Decimals(_))) {
            return Err(e);
        }
        Ok(18)
    }

    async fn symbol(&self) -> ChainResult<String> {
        Ok("EURe".to_string())
    }

    fn settlement_token(&self) -> Address {
        self.token
    }

    async fn block_number(&self) -> ChainResult<u64> {
        Ok(self.state().tx_counter)
    }
}

#[async_trait]
impl WalletFactory for MockChain {
    async fn predict_address(&self, owner: Address, salt: U256) -> ChainResult<Address> {
        Ok(self.predict_sync(owner, salt))
    }

    async fn deploy(&self, owner: Address, salt: U256) -> ChainResult<WalletDeployment> {
        let address = self.predict_sync(owner, salt);
        let mut state = self.state();
        if let Some(e) = state.take_failure(|f| matches!(f, MockFailure::Deploy(_))) {
            return Err(e);
        }
        if state.wallets.contains_key(&address) {
            // CREATE2 collision reverts in the factory
            let tx_hash = state.next_hash();
            return Err(ChainError::Reverted { tx_hash });
        }
        state.wallets.insert(address, owner);
        state.deploys += 1;
        Ok(WalletDeployment {
            address,
            tx_hash: state.next_hash(),
        })
    }

    async fn is_deployed(&self, wallet: Address) -> ChainResult<bool> {
        Ok(self.is_deployed_sync(wallet))
    }
}

#[async_trait]
impl MultisigWallet for MockChain {
    async fn execute(
        &self,
        owner_key: &RawKey,
        wallet: Address,
        call: ChainCall,
    ) -> ChainResult<TxReceipt> {
        self.pause().await;
        let owner = signer_from_key(owner_key)?.address();
        let mut state = self.state();
        if let Some(e) = state.take_failure(|f| matches!(f, MockFailure::Execute(_))) {
            return Err(e);
        }
        state.calls += 1;

        if state.wallets.get(&wallet) != Some(&owner) {
            let tx_hash = state.next_hash();
            return Err(ChainError::Reverted { tx_hash });
        }
        if call.to == self.token {
            state.transfer_token(wallet, &call)?;
        }
        Ok(state.receipt())
    }
}

/// Fully wired services over a [`MockChain`] and a temporary ledger.
pub struct Harness {
    _dir: tempfile::TempDir,
    pub chain: Arc<MockChain>,
    pub ledger: Arc<RedbLedger>,
    pub vault: Arc<KeyVault>,
    pub saga: Arc<ProvisioningSaga>,
    pub funds: Arc<FundMovement>,
    pub locks: Arc<AccountLocks>,
    pub operator: Address,
    pub vehicle: Address,
    pub gas_amount: U256,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = Arc::new(RedbLedger::open(&dir.path().join("ledger.redb")).expect("ledger"));
        let vault = Arc::new(KeyVault::new(&[7u8; 32]).expect("vault"));
        let chain = Arc::new(MockChain::new(Address::repeat_byte(0xEE)));

        let operator_key = Arc::new(RawKey::new(OPERATOR_KEY));
        let operator = signer_from_key(&operator_key).expect("operator").address();
        let vehicle = Address::repeat_byte(0x5B);
        let gas_amount = U256::from(10_000_000_000_000_000u64);

        chain.set_token_balance(operator, units(1_000_000));

        let locks = Arc::new(AccountLocks::new());
        let saga = Arc::new(ProvisioningSaga::new(
            ledger.clone(),
            vault.clone(),
            chain.clone(),
            chain.clone(),
            locks.clone(),
            operator_key.clone(),
            operator,
            SEPOLIA,
            "FEURE",
            gas_amount,
        ));
        let funds = Arc::new(FundMovement::new(
            ledger.clone(),
            vault.clone(),
            chain.clone(),
            chain.clone(),
            operator_key,
            operator,
            vehicle,
            SEPOLIA,
            "FEURE",
        ));

        Self {
            _dir: dir,
            chain,
            ledger,
            vault,
            saga,
            funds,
            locks,
            operator,
            vehicle,
            gas_amount,
        }
    }

    /// Sign up `email` with password `secret` whatever the outcome.
    pub async fn signup(&self, email: &str) -> (UserAccount, AuthenticatedUser) {
        let report = self
            .saga
            .signup(SignupRequest {
                name: "Test User".into(),
                email: email.into(),
                password: "secret".into(),
            })
            .await
            .expect("signup");
        let user = AuthenticatedUser {
            account_id: report.account.id.clone(),
            expires_at: i64::MAX,
        };
        (report.account, user)
    }

    /// Sign up `email` and require a linked wallet.
    pub async fn provisioned_user(&self, email: &str) -> (UserAccount, AuthenticatedUser) {
        let (account, user) = self.signup(email).await;
        assert!(account.wallet_address.is_some(), "wallet not linked");
        (account, user)
    }

    /// Credit settlement tokens to the account's Safe.
    pub fn fund_wallet(&self, account: &UserAccount, amount: U256) {
        let wallet: Address = account
            .wallet_address
            .as_deref()
            .expect("wallet linked")
            .parse()
            .expect("wallet address");
        self.chain.set_token_balance(wallet, amount);
    }

    /// Application state for router tests.
    pub fn state(&self) -> AppState {
        let ledger: Arc<dyn LedgerStore> = self.ledger.clone();
        AppState {
            ledger,
            provisioning: self.saga.clone(),
            funds: self.funds.clone(),
            sessions: Arc::new(SessionManager::new(SESSION_SECRET)),
            locks: self.locks.clone(),
            signer: self.chain.clone(),
            monerium: None,
            secure_cookies: false,
        }
    }
}
