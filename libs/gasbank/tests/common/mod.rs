#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gasbank::{
    EnsureAccountOptions, GasAccount, LedgerService, MemoryStore, Store, Transaction,
};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Ledger over an in-memory store, with convenience methods for setup
pub struct TestLedger {
    pub ledger: LedgerService,
    pub store: Arc<MemoryStore>,
}

impl TestLedger {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let ledger = LedgerService::new(store.clone() as Arc<dyn Store>);
        Self { ledger, store }
    }

    /// Create an account for a fresh owner and return it
    pub async fn account(&self) -> GasAccount {
        self.account_with(EnsureAccountOptions::wallet(TestData::wallet()))
            .await
    }

    pub async fn account_with(&self, options: EnsureAccountOptions) -> GasAccount {
        self.ledger
            .ensure_account_with_options(&TestData::owner(), options)
            .await
            .expect("Failed to create account")
    }

    /// Create an account and credit it with `amount`
    pub async fn funded_account(&self, amount: Decimal) -> GasAccount {
        let account = self.account().await;
        self.deposit(&account, amount).await;
        self.reload(&account).await
    }

    pub async fn deposit(&self, account: &GasAccount, amount: Decimal) -> Transaction {
        let (_, tx) = self
            .ledger
            .deposit(account.id, amount, &TestData::chain_tx(), "sender", &account.wallet_address)
            .await
            .expect("Failed to deposit");
        tx
    }

    pub async fn withdraw(&self, account: &GasAccount, amount: Decimal) -> Transaction {
        let (_, tx) = self
            .ledger
            .withdraw(&account.account_id, account.id, amount, "destination")
            .await
            .expect("Failed to withdraw");
        tx
    }

    pub async fn reload(&self, account: &GasAccount) -> GasAccount {
        self.ledger
            .get_account(account.id)
            .await
            .expect("Failed to reload account")
    }

    pub async fn transaction(&self, id: Uuid) -> Transaction {
        self.store
            .get_gas_transaction(id)
            .await
            .expect("Failed to load transaction")
    }
}

/// Asserts the balance fields of `account`
#[track_caller]
pub fn assert_balances(
    account: &GasAccount,
    balance: Decimal,
    available: Decimal,
    pending: Decimal,
    locked: Decimal,
) {
    assert_eq!(
        (account.balance, account.available, account.pending, account.locked),
        (balance, available, pending, locked),
        "balance/available/pending/locked mismatch"
    );
    assert!(
        account.check_invariants().is_ok(),
        "account invariants violated: {:?}",
        account.check_invariants()
    );
}

/// Test data generators
pub struct TestData;

impl TestData {
    pub fn owner() -> String {
        format!("acct_{}", &Uuid::new_v4().simple().to_string()[..12])
    }

    pub fn wallet() -> String {
        format!("NX{}", Uuid::new_v4().simple())
    }

    pub fn chain_tx() -> String {
        format!("0x{}", Uuid::new_v4().simple())
    }
}

/// Test timing utilities
pub struct TestTiming;

impl TestTiming {
    /// Wait for a condition to be true, with timeout
    pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
    where
        F: Fn() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}
