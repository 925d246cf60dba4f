use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use gasbank::{
    normalize_wallet_address, Approval, DeadLetter, GasAccount, SettlementAttempt, Store,
    StoreError, StoreResult, Transaction, TransactionStatus, TransactionType, WithdrawalSchedule,
};
use tracing::debug;
use uuid::Uuid;

use crate::models::accounts::GasAccountRow;
use crate::models::approvals::ApprovalRow;
use crate::models::dead_letters::DeadLetterRow;
use crate::models::schedules::ScheduleRow;
use crate::models::settlement_attempts::SettlementAttemptRow;
use crate::models::transactions::GasTransactionRow;
use crate::schema::{
    gas_accounts, gas_dead_letters, gas_settlement_attempts, gas_transactions,
    gas_withdrawal_approvals, gas_withdrawal_schedules,
};
use crate::{create_pool, DbConnection, DbError, DbPool};

/// [`Store`] backed by PostgreSQL through a bb8 pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        Ok(Self::new(create_pool(database_url).await?))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn conn(&self) -> StoreResult<DbConnection> {
        self.pool
            .get_owned()
            .await
            .map_err(|e| DbError::from(e).into())
    }
}

fn db(err: diesel::result::Error) -> StoreError {
    DbError::from(err).into()
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl Store for PgStore {
    async fn create_gas_account(&self, account: GasAccount) -> StoreResult<GasAccount> {
        let row = GasAccountRow::from_account(&account)?;
        let mut conn = self.conn().await?;
        let created = diesel::insert_into(gas_accounts::table)
            .values(&row)
            .returning(GasAccountRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(db)?;
        debug!(gas_account_id = %created.id, "gas account row inserted");
        created.into_account()
    }

    async fn update_gas_account(&self, account: GasAccount) -> StoreResult<GasAccount> {
        let mut row = GasAccountRow::from_account(&account)?;
        row.updated_at = Utc::now();
        let mut conn = self.conn().await?;
        diesel::update(gas_accounts::table.find(row.id))
            .set(&row)
            .returning(GasAccountRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(db)?
            .ok_or_else(|| StoreError::not_found(format!("gas account {}", account.id)))?
            .into_account()
    }

    async fn get_gas_account(&self, id: Uuid) -> StoreResult<GasAccount> {
        let mut conn = self.conn().await?;
        gas_accounts::table
            .find(id)
            .select(GasAccountRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(db)?
            .ok_or_else(|| StoreError::not_found(format!("gas account {id}")))?
            .into_account()
    }

    async fn get_gas_account_by_wallet(&self, wallet: &str) -> StoreResult<GasAccount> {
        let wallet = normalize_wallet_address(wallet);
        if wallet.is_empty() {
            return Err(StoreError::not_found("wallet"));
        }
        let mut conn = self.conn().await?;
        gas_accounts::table
            .filter(gas_accounts::wallet_address.eq(&wallet))
            .select(GasAccountRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(db)?
            .ok_or_else(|| StoreError::not_found(format!("wallet {wallet}")))?
            .into_account()
    }

    async fn list_gas_accounts(&self, owner: Option<&str>) -> StoreResult<Vec<GasAccount>> {
        let mut conn = self.conn().await?;
        let rows: Vec<GasAccountRow> = match owner {
            Some(owner) => {
                gas_accounts::table
                    .filter(gas_accounts::account_id.eq(owner))
                    .order(gas_accounts::created_at.asc())
                    .select(GasAccountRow::as_select())
                    .load(&mut conn)
                    .await
            }
            None => {
                gas_accounts::table
                    .order(gas_accounts::created_at.asc())
                    .select(GasAccountRow::as_select())
                    .load(&mut conn)
                    .await
            }
        }
        .map_err(db)?;
        rows.into_iter().map(GasAccountRow::into_account).collect()
    }

    async fn create_gas_transaction(&self, tx: Transaction) -> StoreResult<Transaction> {
        let row = GasTransactionRow::from_transaction(&tx)?;
        let mut conn = self.conn().await?;
        diesel::insert_into(gas_transactions::table)
            .values(&row)
            .returning(GasTransactionRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(db)?
            .into_transaction()
    }

    async fn update_gas_transaction(&self, tx: Transaction) -> StoreResult<Transaction> {
        let mut row = GasTransactionRow::from_transaction(&tx)?;
        row.updated_at = Utc::now();
        let mut conn = self.conn().await?;
        diesel::update(gas_transactions::table.find(row.id))
            .set(&row)
            .returning(GasTransactionRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()
            .map_err(db)?
            .ok_or_else(|| StoreError::not_found(format!("transaction {}", tx.id)))?
            .into_transaction()
    }

    async fn get_gas_transaction(&self, id: Uuid) -> StoreResult<Transaction> {
        let mut conn = self.conn().await?;
        gas_transactions::table
            .find(id)
            .select(GasTransactionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(db)?
            .ok_or_else(|| StoreError::not_found(format!("transaction {id}")))?
            .into_transaction()
    }

    async fn list_gas_transactions(
        &self,
        gas_account_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<Transaction>> {
        let mut conn = self.conn().await?;
        let rows: Vec<GasTransactionRow> = gas_transactions::table
            .filter(gas_transactions::account_id.eq(gas_account_id))
            .order(gas_transactions::created_at.desc())
            .limit(sql_limit(limit))
            .select(GasTransactionRow::as_select())
            .load(&mut conn)
            .await
            .map_err(db)?;
        rows.into_iter()
            .map(GasTransactionRow::into_transaction)
            .collect()
    }

    async fn list_pending_withdrawals(&self) -> StoreResult<Vec<Transaction>> {
        let mut conn = self.conn().await?;
        let rows: Vec<GasTransactionRow> = gas_transactions::table
            .filter(gas_transactions::tx_type.eq(TransactionType::Withdrawal.as_str()))
            .filter(gas_transactions::status.eq(TransactionStatus::Pending.as_str()))
            .order(gas_transactions::created_at.asc())
            .select(GasTransactionRow::as_select())
            .load(&mut conn)
            .await
            .map_err(db)?;
        rows.into_iter()
            .map(GasTransactionRow::into_transaction)
            .collect()
    }

    async fn upsert_withdrawal_approval(&self, approval: Approval) -> StoreResult<Approval> {
        use crate::schema::gas_withdrawal_approvals::dsl::*;

        let mut row = ApprovalRow::from(&approval);
        let now = Utc::now();
        row.created_at = now;
        row.updated_at = now;
        let mut conn = self.conn().await?;
        diesel::insert_into(gas_withdrawal_approvals)
            .values(&row)
            .on_conflict((transaction_id, approver))
            .do_update()
            .set((
                status.eq(excluded(status)),
                signature.eq(excluded(signature)),
                note.eq(excluded(note)),
                decided_at.eq(excluded(decided_at)),
                updated_at.eq(excluded(updated_at)),
            ))
            .returning(ApprovalRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(db)?
            .into_approval()
    }

    async fn list_withdrawal_approvals(&self, transaction_id: Uuid) -> StoreResult<Vec<Approval>> {
        let mut conn = self.conn().await?;
        let rows: Vec<ApprovalRow> = gas_withdrawal_approvals::table
            .filter(gas_withdrawal_approvals::transaction_id.eq(transaction_id))
            .order(gas_withdrawal_approvals::decided_at.desc())
            .select(ApprovalRow::as_select())
            .load(&mut conn)
            .await
            .map_err(db)?;
        rows.into_iter().map(ApprovalRow::into_approval).collect()
    }

    async fn save_withdrawal_schedule(
        &self,
        schedule: WithdrawalSchedule,
    ) -> StoreResult<WithdrawalSchedule> {
        use crate::schema::gas_withdrawal_schedules::dsl::*;

        let mut row = ScheduleRow::from(&schedule);
        row.updated_at = Utc::now();
        let mut conn = self.conn().await?;
        let saved = diesel::insert_into(gas_withdrawal_schedules)
            .values(&row)
            .on_conflict(transaction_id)
            .do_update()
            .set((
                schedule_at.eq(excluded(schedule_at)),
                cron_expression.eq(excluded(cron_expression)),
                next_run_at.eq(excluded(next_run_at)),
                last_run_at.eq(excluded(last_run_at)),
                updated_at.eq(excluded(updated_at)),
            ))
            .returning(ScheduleRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(db)?;
        Ok(saved.into())
    }

    async fn get_withdrawal_schedule(
        &self,
        transaction_id: Uuid,
    ) -> StoreResult<WithdrawalSchedule> {
        let mut conn = self.conn().await?;
        gas_withdrawal_schedules::table
            .find(transaction_id)
            .select(ScheduleRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(db)?
            .map(WithdrawalSchedule::from)
            .ok_or_else(|| StoreError::not_found(format!("schedule {transaction_id}")))
    }

    async fn delete_withdrawal_schedule(&self, transaction_id: Uuid) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        diesel::delete(gas_withdrawal_schedules::table.find(transaction_id))
            .execute(&mut conn)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn list_due_withdrawal_schedules(
        &self,
        before: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<WithdrawalSchedule>> {
        let mut conn = self.conn().await?;
        let rows: Vec<ScheduleRow> = gas_withdrawal_schedules::table
            .filter(gas_withdrawal_schedules::schedule_at.le(before))
            .order(gas_withdrawal_schedules::schedule_at.asc())
            .limit(sql_limit(limit))
            .select(ScheduleRow::as_select())
            .load(&mut conn)
            .await
            .map_err(db)?;
        Ok(rows.into_iter().map(WithdrawalSchedule::from).collect())
    }

    async fn record_settlement_attempt(
        &self,
        attempt: SettlementAttempt,
    ) -> StoreResult<SettlementAttempt> {
        let row = SettlementAttemptRow::from_attempt(&attempt)?;
        let mut conn = self.conn().await?;
        diesel::insert_into(gas_settlement_attempts::table)
            .values(&row)
            .on_conflict((
                gas_settlement_attempts::transaction_id,
                gas_settlement_attempts::attempt,
            ))
            .do_update()
            .set(&row)
            .returning(SettlementAttemptRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(db)?
            .into_attempt()
    }

    async fn list_settlement_attempts(
        &self,
        transaction_id: Uuid,
        limit: usize,
    ) -> StoreResult<Vec<SettlementAttempt>> {
        let mut conn = self.conn().await?;
        let rows: Vec<SettlementAttemptRow> = gas_settlement_attempts::table
            .filter(gas_settlement_attempts::transaction_id.eq(transaction_id))
            .order(gas_settlement_attempts::attempt.desc())
            .limit(sql_limit(limit))
            .select(SettlementAttemptRow::as_select())
            .load(&mut conn)
            .await
            .map_err(db)?;
        rows.into_iter()
            .map(SettlementAttemptRow::into_attempt)
            .collect()
    }

    async fn upsert_dead_letter(&self, entry: DeadLetter) -> StoreResult<DeadLetter> {
        use crate::schema::gas_dead_letters::dsl::*;

        let mut row = DeadLetterRow::from_entry(&entry)?;
        row.updated_at = Utc::now();
        let mut conn = self.conn().await?;
        diesel::insert_into(gas_dead_letters)
            .values(&row)
            .on_conflict(transaction_id)
            .do_update()
            .set((
                account_id.eq(excluded(account_id)),
                gas_account_id.eq(excluded(gas_account_id)),
                reason.eq(excluded(reason)),
                last_error.eq(excluded(last_error)),
                last_attempt_at.eq(excluded(last_attempt_at)),
                retries.eq(excluded(retries)),
                updated_at.eq(excluded(updated_at)),
            ))
            .returning(DeadLetterRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(db)?
            .into_entry()
    }

    async fn get_dead_letter(&self, transaction_id: Uuid) -> StoreResult<DeadLetter> {
        let mut conn = self.conn().await?;
        gas_dead_letters::table
            .find(transaction_id)
            .select(DeadLetterRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(db)?
            .ok_or_else(|| StoreError::not_found(format!("dead letter {transaction_id}")))?
            .into_entry()
    }

    async fn list_dead_letters(
        &self,
        owner: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<DeadLetter>> {
        let mut conn = self.conn().await?;
        let rows: Vec<DeadLetterRow> = match owner {
            Some(owner) => {
                gas_dead_letters::table
                    .filter(gas_dead_letters::account_id.eq(owner))
                    .order(gas_dead_letters::updated_at.desc())
                    .limit(sql_limit(limit))
                    .select(DeadLetterRow::as_select())
                    .load(&mut conn)
                    .await
            }
            None => {
                gas_dead_letters::table
                    .order(gas_dead_letters::updated_at.desc())
                    .limit(sql_limit(limit))
                    .select(DeadLetterRow::as_select())
                    .load(&mut conn)
                    .await
            }
        }
        .map_err(db)?;
        rows.into_iter().map(DeadLetterRow::into_entry).collect()
    }

    async fn remove_dead_letter(&self, transaction_id: Uuid) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        diesel::delete(gas_dead_letters::table.find(transaction_id))
            .execute(&mut conn)
            .await
            .map_err(db)?;
        Ok(())
    }
}
