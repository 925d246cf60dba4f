use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::store::Store;
use crate::types::{
    normalize_wallet_address, Approval, DeadLetter, GasAccount, SettlementAttempt, Transaction,
    TransactionType, WithdrawalSchedule,
};
use crate::state::TransactionStatus;

#[derive(Default)]
struct Tables {
    accounts: HashMap<Uuid, GasAccount>,
    transactions: HashMap<Uuid, Transaction>,
    approvals: HashMap<Uuid, Vec<Approval>>,
    schedules: HashMap<Uuid, WithdrawalSchedule>,
    attempts: HashMap<Uuid, Vec<SettlementAttempt>>,
    dead_letters: HashMap<Uuid, DeadLetter>,
}

impl Tables {
    fn wallet_taken(&self, wallet: &str, except: Uuid) -> bool {
        !wallet.is_empty()
            && self
                .accounts
                .values()
                .any(|a| a.id != except && normalize_wallet_address(&a.wallet_address) == wallet)
    }
}

/// In-memory [`Store`] (intended for tests and local development).
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    /// Countdown to an injected transaction write failure; zero is disarmed.
    fail_transaction_writes: AtomicUsize,
    fail_schedule_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next transaction create or update fail with a backend error.
    pub fn fail_next_transaction_write(&self) {
        self.fail_transaction_write_after(0);
    }

    /// Lets `skip` transaction writes through, then fails the one after.
    pub fn fail_transaction_write_after(&self, skip: usize) {
        self.fail_transaction_writes.store(skip + 1, Ordering::SeqCst);
    }

    /// Makes the next schedule save fail with a backend error.
    pub fn fail_next_schedule_write(&self) {
        self.fail_schedule_writes.store(true, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> StoreResult<()> {
        let previous = self
            .fail_transaction_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            return Err(StoreError::backend("injected transaction write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_gas_account(&self, mut account: GasAccount) -> StoreResult<GasAccount> {
        let mut tables = self.tables.write().await;
        account.wallet_address = normalize_wallet_address(&account.wallet_address);
        if tables.wallet_taken(&account.wallet_address, account.id) {
            return Err(StoreError::Conflict(format!(
                "wallet {} already assigned",
                account.wallet_address
            )));
        }
        if tables.accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict(format!("gas account {}", account.id)));
        }
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn update_gas_account(&self, mut account: GasAccount) -> StoreResult<GasAccount> {
        let mut tables = self.tables.write().await;
        if !tables.accounts.contains_key(&account.id) {
            return Err(StoreError::not_found(format!("gas account {}", account.id)));
        }
        account.wallet_address = normalize_wallet_address(&account.wallet_address);
        if tables.wallet_taken(&account.wallet_address, account.id) {
            return Err(StoreError::Conflict(format!(
                "wallet {} already assigned",
                account.wallet_address
            )));
        }
        account.updated_at = Utc::now();
        tables.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn get_gas_account(&self, id: Uuid) -> StoreResult<GasAccount> {
        let tables = self.tables.read().await;
        tables
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("gas account {id}")))
    }

    async fn get_gas_account_by_wallet(&self, wallet: &str) -> StoreResult<GasAccount> {
        let wallet = normalize_wallet_address(wallet);
        let tables = self.tables.read().await;
        tables
            .accounts
            .values()
            .find(|a| !wallet.is_empty() && a.wallet_address == wallet)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("wallet {wallet}")))
    }

    async fn list_gas_accounts(&self, owner: Option<&str>) -> StoreResult<Vec<GasAccount>> {
        let tables = self.tables.read().await;
        let mut accounts: Vec<GasAccount> = tables
            .accounts
            .values()
            .filter(|a| owner.map_or(true, |o| a.account_id == o))
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn create_gas_transaction(&self, tx: Transaction) -> StoreResult<Transaction> {
        self.take_injected_failure()?;
        let mut tables = self.tables.write().await;
        if tables.transactions.contains_key(&tx.id) {
            return Err(StoreError::Conflict(format!("transaction {}", tx.id)));
        }
        let mut stored = tx;
        stored.approvals.clear();
        tables.transactions.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_gas_transaction(&self, mut tx: Transaction) -> StoreResult<Transaction> {
        self.take_injected_failure()?;
        let mut tables = self.tables.write().await;
        if !tables.transactions.contains_key(&tx.id) {
            return Err(StoreError::not_found(format!("transaction {}", tx.id)));
        }
        tx.approvals.clear();
        tx.updated_at = Utc::now();
        tables.transactions.insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn get_gas_transaction(&self, id: Uuid) -> StoreResult<Transaction> {
        let tables = self.tables.read().await;
        tables
            .transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("transaction {id}")))
    }

    async fn list_gas_transactions(
        &self,
        gas_account_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<Transaction>> {
        let tables = self.tables.read().await;
        let mut txs: Vec<Transaction> = tables
            .transactions
            .values()
            .filter(|tx| tx.account_id == gas_account_id)
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        txs.truncate(limit);
        Ok(txs)
    }

    async fn list_pending_withdrawals(&self) -> StoreResult<Vec<Transaction>> {
        let tables = self.tables.read().await;
        let mut txs: Vec<Transaction> = tables
            .transactions
            .values()
            .filter(|tx| {
                tx.tx_type == TransactionType::Withdrawal && tx.status == TransactionStatus::Pending
            })
            .cloned()
            .collect();
        txs.sort_by_key(|tx| tx.created_at);
        Ok(txs)
    }

    async fn upsert_withdrawal_approval(&self, mut approval: Approval) -> StoreResult<Approval> {
        let mut tables = self.tables.write().await;
        let votes = tables.approvals.entry(approval.transaction_id).or_default();
        let now = Utc::now();
        approval.updated_at = now;
        match votes.iter_mut().find(|v| v.approver == approval.approver) {
            Some(existing) => {
                approval.created_at = existing.created_at;
                *existing = approval.clone();
            }
            None => {
                approval.created_at = now;
                votes.push(approval.clone());
            }
        }
        Ok(approval)
    }

    async fn list_withdrawal_approvals(&self, transaction_id: Uuid) -> StoreResult<Vec<Approval>> {
        let tables = self.tables.read().await;
        let mut votes = tables
            .approvals
            .get(&transaction_id)
            .cloned()
            .unwrap_or_default();
        votes.sort_by(|a, b| b.decided_at.cmp(&a.decided_at));
        Ok(votes)
    }

    async fn save_withdrawal_schedule(
        &self,
        mut schedule: WithdrawalSchedule,
    ) -> StoreResult<WithdrawalSchedule> {
        if self.fail_schedule_writes.swap(false, Ordering::SeqCst) {
            return Err(StoreError::backend("injected schedule write failure"));
        }
        let mut tables = self.tables.write().await;
        schedule.updated_at = Utc::now();
        if let Some(existing) = tables.schedules.get(&schedule.transaction_id) {
            schedule.created_at = existing.created_at;
        }
        tables
            .schedules
            .insert(schedule.transaction_id, schedule.clone());
        Ok(schedule)
    }

    async fn get_withdrawal_schedule(
        &self,
        transaction_id: Uuid,
    ) -> StoreResult<WithdrawalSchedule> {
        let tables = self.tables.read().await;
        tables
            .schedules
            .get(&transaction_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("schedule {transaction_id}")))
    }

    async fn delete_withdrawal_schedule(&self, transaction_id: Uuid) -> StoreResult<()> {
        self.tables.write().await.schedules.remove(&transaction_id);
        Ok(())
    }

    async fn list_due_withdrawal_schedules(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<WithdrawalSchedule>> {
        let tables = self.tables.read().await;
        let mut due: Vec<WithdrawalSchedule> = tables
            .schedules
            .values()
            .filter(|s| s.schedule_at <= before)
            .cloned()
            .collect();
        due.sort_by_key(|s| s.schedule_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn record_settlement_attempt(
        &self,
        attempt: SettlementAttempt,
    ) -> StoreResult<SettlementAttempt> {
        let mut tables = self.tables.write().await;
        let history = tables.attempts.entry(attempt.transaction_id).or_default();
        match history.iter_mut().find(|a| a.attempt == attempt.attempt) {
            Some(existing) => *existing = attempt.clone(),
            None => history.push(attempt.clone()),
        }
        Ok(attempt)
    }

    async fn list_settlement_attempts(
        &self,
        transaction_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<SettlementAttempt>> {
        let tables = self.tables.read().await;
        let mut history = tables
            .attempts
            .get(&transaction_id)
            .cloned()
            .unwrap_or_default();
        history.sort_by(|a, b| b.attempt.cmp(&a.attempt));
        history.truncate(limit);
        Ok(history)
    }

    async fn upsert_dead_letter(&self, mut entry: DeadLetter) -> StoreResult<DeadLetter> {
        let mut tables = self.tables.write().await;
        entry.updated_at = Utc::now();
        if let Some(existing) = tables.dead_letters.get(&entry.transaction_id) {
            entry.created_at = existing.created_at;
        }
        tables
            .dead_letters
            .insert(entry.transaction_id, entry.clone());
        Ok(entry)
    }

    async fn get_dead_letter(&self, transaction_id: Uuid) -> StoreResult<DeadLetter> {
        let tables = self.tables.read().await;
        tables
            .dead_letters
            .get(&transaction_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("dead letter {transaction_id}")))
    }

    async fn list_dead_letters(
        &self,
        owner: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<DeadLetter>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<DeadLetter> = tables
            .dead_letters
            .values()
            .filter(|d| owner.map_or(true, |o| d.account_id == o))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn remove_dead_letter(&self, transaction_id: Uuid) -> StoreResult<()> {
        self.tables.write().await.dead_letters.remove(&transaction_id);
        Ok(())
    }
}
