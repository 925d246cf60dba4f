use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{
    Approval, DeadLetter, GasAccount, SettlementAttempt, Transaction, WithdrawalSchedule,
};

/// Durable CRUD for ledger records.
///
/// Each call is expected to be atomic on its own. The ledger never relies on
/// two calls committing together.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with `StoreError::Conflict` when the wallet address is taken.
    async fn create_gas_account(&self, account: GasAccount) -> StoreResult<GasAccount>;
    async fn update_gas_account(&self, account: GasAccount) -> StoreResult<GasAccount>;
    async fn get_gas_account(&self, id: Uuid) -> StoreResult<GasAccount>;
    /// Looks up by normalized (lower-cased, trimmed) wallet address.
    async fn get_gas_account_by_wallet(&self, wallet: &str) -> StoreResult<GasAccount>;
    /// All accounts when `owner` is `None`, oldest first.
    async fn list_gas_accounts(&self, owner: Option<&str>) -> StoreResult<Vec<GasAccount>>;

    async fn create_gas_transaction(&self, tx: Transaction) -> StoreResult<Transaction>;
    async fn update_gas_transaction(&self, tx: Transaction) -> StoreResult<Transaction>;
    async fn get_gas_transaction(&self, id: Uuid) -> StoreResult<Transaction>;
    /// Newest first.
    async fn list_gas_transactions(
        &self,
        gas_account_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<Transaction>>;
    /// Withdrawals in `pending` status across all accounts, oldest first.
    async fn list_pending_withdrawals(&self) -> StoreResult<Vec<Transaction>>;

    /// Inserts or overwrites the vote for `(transaction_id, approver)`.
    async fn upsert_withdrawal_approval(&self, approval: Approval) -> StoreResult<Approval>;
    async fn list_withdrawal_approvals(&self, transaction_id: Uuid) -> StoreResult<Vec<Approval>>;

    async fn save_withdrawal_schedule(
        &self,
        schedule: WithdrawalSchedule,
    ) -> StoreResult<WithdrawalSchedule>;
    async fn get_withdrawal_schedule(&self, transaction_id: Uuid)
        -> StoreResult<WithdrawalSchedule>;
    async fn delete_withdrawal_schedule(&self, transaction_id: Uuid) -> StoreResult<()>;
    /// Schedules with `schedule_at <= before`, earliest first.
    async fn list_due_withdrawal_schedules(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<WithdrawalSchedule>>;

    async fn record_settlement_attempt(
        &self,
        attempt: SettlementAttempt,
    ) -> StoreResult<SettlementAttempt>;
    /// Most recent attempt first.
    async fn list_settlement_attempts(
        &self,
        transaction_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<SettlementAttempt>>;

    async fn upsert_dead_letter(&self, entry: DeadLetter) -> StoreResult<DeadLetter>;
    async fn get_dead_letter(&self, transaction_id: Uuid) -> StoreResult<DeadLetter>;
    /// Most recently updated first; every owner when `owner` is `None`.
    async fn list_dead_letters(
        &self,
        owner: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<DeadLetter>>;
    async fn remove_dead_letter(&self, transaction_id: Uuid) -> StoreResult<()>;
}
