use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{required, LedgerService};
use crate::error::{LedgerError, LedgerResult};
use crate::state::WithdrawalEvent;
use crate::types::{non_empty, DeadLetter, NewSettlementAttempt, SettlementAttempt, Transaction};

impl LedgerService {
    /// Appends a settlement attempt and mirrors it onto the withdrawal's
    /// resolver bookkeeping. Attempt numbers continue from the last recorded
    /// one unless the caller supplies one; `resolver_attempt` counts the tries
    /// since the withdrawal last entered `pending`.
    pub async fn record_settlement_attempt(
        &self,
        attempt: NewSettlementAttempt,
    ) -> LedgerResult<SettlementAttempt> {
        let store = &self.inner.store;
        let tx_id = attempt.transaction_id;
        let _guard = self.inner.tx_locks.lock(&tx_id).await;
        let mut tx = store.get_gas_transaction(tx_id).await?;

        let number = match attempt.attempt {
            Some(n) if n > 0 => n,
            _ => {
                let latest = store.list_settlement_attempts(tx_id, 1).await?;
                latest.first().map_or(1, |last| last.attempt + 1)
            }
        };
        let now = Utc::now();
        let started_at = attempt.started_at.unwrap_or(now);
        let completed_at = attempt.completed_at.unwrap_or(now);
        let latency_ms = attempt
            .latency_ms
            .unwrap_or_else(|| (completed_at - started_at).num_milliseconds())
            .max(0);

        let recorded = store
            .record_settlement_attempt(SettlementAttempt {
                transaction_id: tx_id,
                attempt: number,
                started_at,
                completed_at,
                latency_ms,
                status: attempt.status,
                error: attempt.error.as_deref().and_then(non_empty),
            })
            .await?;

        tx.resolver_attempt += 1;
        tx.resolver_error = recorded.error.clone();
        tx.last_attempt_at = Some(completed_at);
        tx.next_attempt_at = if attempt.status.is_final() {
            None
        } else {
            attempt.next_attempt_at
        };
        tx.dispatched_at.get_or_insert(started_at);
        store.update_gas_transaction(tx).await?;

        Ok(recorded)
    }

    pub async fn list_settlement_attempts(
        &self,
        owner: &str,
        tx_id: Uuid,
        limit: usize,
    ) -> LedgerResult<Vec<SettlementAttempt>> {
        let owner = required(owner, "account_id")?;
        self.owned_transaction(&owner, tx_id).await?;
        let limit = self.clamp_limit(limit);
        Ok(self
            .inner
            .store
            .list_settlement_attempts(tx_id, limit)
            .await?)
    }

    /// Parks a withdrawal that automatic settlement gave up on. A failed
    /// withdrawal has its funds reserved again so a retry can still settle.
    pub async fn mark_dead_letter(
        &self,
        tx_id: Uuid,
        reason: &str,
        last_error: &str,
    ) -> LedgerResult<Transaction> {
        let reason = required(reason, "reason")?;
        let last_error = non_empty(last_error);
        let this = self.clone();
        self.detached(async move {
            let store = &this.inner.store;
            let _guard = this.inner.tx_locks.lock(&tx_id).await;
            let mut tx = store.get_gas_transaction(tx_id).await?;
            if !tx.is_withdrawal() {
                return Err(LedgerError::validation(format!(
                    "transaction {tx_id} is not a withdrawal"
                )));
            }
            tx.status.apply(WithdrawalEvent::DeadLettered)?;
            let account = store.get_gas_account(tx.account_id).await?;

            let now = Utc::now();
            store
                .upsert_dead_letter(DeadLetter {
                    transaction_id: tx_id,
                    account_id: account.account_id.clone(),
                    gas_account_id: account.id,
                    reason: reason.clone(),
                    last_error: last_error.clone(),
                    last_attempt_at: tx.last_attempt_at,
                    retries: tx.resolver_attempt,
                    created_at: now,
                    updated_at: now,
                })
                .await?;

            tx.dead_letter_reason = Some(reason.clone());
            if last_error.is_some() {
                tx.resolver_error = last_error;
            }
            tx.next_attempt_at = None;
            match this.apply_event(tx, WithdrawalEvent::DeadLettered).await {
                Ok(applied) => {
                    warn!(transaction_id = %tx_id, reason = %reason, "gas withdrawal dead-lettered");
                    Ok(applied.transaction)
                }
                Err(err) => {
                    if let Err(cleanup) = store.remove_dead_letter(tx_id).await {
                        error!(transaction_id = %tx_id, error = %cleanup, "failed to remove orphaned dead letter");
                    }
                    Err(err)
                }
            }
        })
        .await
    }

    /// Puts a dead-lettered withdrawal back into `pending` with fresh
    /// resolver state.
    pub async fn retry_dead_letter(&self, owner: &str, tx_id: Uuid) -> LedgerResult<Transaction> {
        let owner = required(owner, "account_id")?;
        let this = self.clone();
        self.detached(async move {
            let store = &this.inner.store;
            let _guard = this.inner.tx_locks.lock(&tx_id).await;
            this.owned_dead_letter(&owner, tx_id).await?;

            let mut tx = store.get_gas_transaction(tx_id).await?;
            tx.dead_letter_reason = None;
            tx.resolver_attempt = 0;
            tx.resolver_error = None;
            tx.last_attempt_at = None;
            tx.next_attempt_at = None;
            tx.resolved_at = None;
            let applied = this.apply_event(tx, WithdrawalEvent::Retried).await?;

            store.remove_dead_letter(tx_id).await?;
            info!(transaction_id = %tx_id, account_id = %owner, "dead-lettered withdrawal requeued");
            Ok(applied.transaction)
        })
        .await
    }

    /// Drops the dead-letter entry. The withdrawal itself stays as it is: it
    /// remains `dead_letter` with its amount held in `pending`, and with the
    /// entry gone it can no longer be retried. Releasing those funds is left
    /// to an operator.
    pub async fn delete_dead_letter(&self, owner: &str, tx_id: Uuid) -> LedgerResult<()> {
        let owner = required(owner, "account_id")?;
        let _guard = self.inner.tx_locks.lock(&tx_id).await;
        self.owned_dead_letter(&owner, tx_id).await?;
        self.inner.store.remove_dead_letter(tx_id).await?;
        info!(transaction_id = %tx_id, account_id = %owner, "dead letter deleted");
        Ok(())
    }

    pub async fn list_dead_letters(&self, owner: &str, limit: usize) -> LedgerResult<Vec<DeadLetter>> {
        let owner = required(owner, "account_id")?;
        let limit = self.clamp_limit(limit);
        Ok(self
            .inner
            .store
            .list_dead_letters(Some(&owner), limit)
            .await?)
    }

    async fn owned_dead_letter(&self, owner: &str, tx_id: Uuid) -> LedgerResult<DeadLetter> {
        let entry = self.inner.store.get_dead_letter(tx_id).await?;
        if entry.account_id != owner {
            warn!(
                transaction_id = %tx_id,
                account_id = owner,
                "rejected access to dead letter of another account"
            );
            return Err(LedgerError::not_found(format!("dead letter {tx_id}")));
        }
        Ok(entry)
    }
}
