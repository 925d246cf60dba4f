use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{check_amount, required, Applied, LedgerService};
use crate::error::{LedgerError, LedgerResult};
use crate::state::{BalanceEffect, TransactionStatus, WithdrawalEvent};
use crate::types::{GasAccount, Transaction, TransactionType, WithdrawalSchedule};

#[derive(Debug, Clone, Default)]
pub struct WithdrawOptions {
    pub amount: Decimal,
    pub to_address: String,
    /// Held as `scheduled` until this instant when it lies in the future.
    pub schedule_at: Option<DateTime<Utc>>,
    pub cron_expression: Option<String>,
}

impl LedgerService {
    /// Credits a confirmed on-chain deposit. Both `balance` and `available`
    /// grow by `amount`.
    pub async fn deposit(
        &self,
        gas_account_id: Uuid,
        amount: Decimal,
        blockchain_tx_id: &str,
        from: &str,
        to: &str,
    ) -> LedgerResult<(GasAccount, Transaction)> {
        check_amount(amount)?;
        let this = self.clone();
        let (chain_tx, from, to) = (blockchain_tx_id.to_string(), from.to_string(), to.to_string());
        self.detached(async move {
            this.deposit_locked(gas_account_id, amount, &chain_tx, &from, &to)
                .await
        })
        .await
    }

    async fn deposit_locked(
        &self,
        gas_account_id: Uuid,
        amount: Decimal,
        chain_tx: &str,
        from: &str,
        to: &str,
    ) -> LedgerResult<(GasAccount, Transaction)> {
        let store = &self.inner.store;
        let _guard = self.inner.account_locks.lock(&gas_account_id).await;
        let original = store.get_gas_account(gas_account_id).await?;

        let mut account = original.clone();
        account.balance += amount;
        account.available += amount;
        let account = self.save_account(account).await?;

        let tx = Transaction::deposit(&account, amount, chain_tx, from, to);
        let tx = match store.create_gas_transaction(tx).await {
            Ok(tx) => tx,
            Err(err) => {
                self.restore_account(original, "deposit").await;
                return Err(err.into());
            }
        };

        info!(
            gas_account_id = %account.id,
            transaction_id = %tx.id,
            amount = %amount,
            "gas deposit recorded"
        );
        Ok((account, tx))
    }

    pub async fn withdraw(
        &self,
        owner: &str,
        gas_account_id: Uuid,
        amount: Decimal,
        to_address: &str,
    ) -> LedgerResult<(GasAccount, Transaction)> {
        let options = WithdrawOptions {
            amount,
            to_address: to_address.to_string(),
            ..WithdrawOptions::default()
        };
        self.withdraw_with_options(owner, gas_account_id, options).await
    }

    /// Reserves funds for a withdrawal after checking every account policy.
    pub async fn withdraw_with_options(
        &self,
        owner: &str,
        gas_account_id: Uuid,
        options: WithdrawOptions,
    ) -> LedgerResult<(GasAccount, Transaction)> {
        let owner = required(owner, "account_id")?;
        check_amount(options.amount)?;
        let this = self.clone();
        self.detached(async move { this.withdraw_locked(owner, gas_account_id, options).await })
            .await
    }

    async fn withdraw_locked(
        &self,
        owner: String,
        gas_account_id: Uuid,
        options: WithdrawOptions,
    ) -> LedgerResult<(GasAccount, Transaction)> {
        let store = &self.inner.store;
        let amount = options.amount;
        let _guard = self.inner.account_locks.lock(&gas_account_id).await;
        let original = store.get_gas_account(gas_account_id).await?;
        if original.account_id != owner {
            warn!(
                gas_account_id = %gas_account_id,
                account_id = %owner,
                "rejected withdrawal from account of another owner"
            );
            return Err(LedgerError::not_found(format!("gas account {gas_account_id}")));
        }
        if options
            .cron_expression
            .as_deref()
            .is_some_and(|cron| !cron.trim().is_empty())
        {
            return Err(LedgerError::CronUnsupported);
        }

        let now = Utc::now();
        if original.available < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        if original.available - amount < original.min_balance {
            return Err(LedgerError::MinBalance);
        }
        let used_today = original.daily_used(now);
        if original.daily_limit > Decimal::ZERO && used_today + amount > original.daily_limit {
            return Err(LedgerError::DailyLimit);
        }

        let schedule_at = options.schedule_at.filter(|at| *at > now);
        let status = match schedule_at {
            Some(_) => TransactionStatus::Scheduled,
            None => TransactionStatus::released(original.required_approvals > 0),
        };

        let mut account = original.clone();
        BalanceEffect::Reserve.apply(&mut account, amount)?;
        account.daily_withdrawal = used_today + amount;
        account.last_withdrawal = Some(now);
        let account = self.save_account(account).await?;

        let tx = Transaction::withdrawal(&account, amount, &options.to_address, status, schedule_at);
        let mut tx = match store.create_gas_transaction(tx).await {
            Ok(tx) => tx,
            Err(err) => {
                self.restore_account(original, "withdrawal").await;
                return Err(err.into());
            }
        };

        if let Some(at) = schedule_at {
            if let Err(err) = store
                .save_withdrawal_schedule(WithdrawalSchedule::once(tx.id, at))
                .await
            {
                error!(transaction_id = %tx.id, error = %err, "failed to persist withdrawal schedule");
                let tx_id = tx.id;
                tx.status = TransactionStatus::Cancelled;
                tx.net_amount = Decimal::ZERO;
                tx.error = Some("schedule could not be persisted".to_string());
                if let Err(cancel_err) = store.update_gas_transaction(tx).await {
                    // The withdrawal is still scheduled, so its funds stay reserved.
                    error!(
                        transaction_id = %tx_id,
                        gas_account_id = %gas_account_id,
                        error = %cancel_err,
                        "failed to cancel unscheduled withdrawal"
                    );
                    return Err(LedgerError::Invariant(format!(
                        "withdrawal {tx_id} is scheduled without a schedule; cancel it to release the funds"
                    )));
                }
                self.restore_account(original, "withdrawal schedule").await;
                return Err(err.into());
            }
        }

        info!(
            gas_account_id = %account.id,
            transaction_id = %tx.id,
            amount = %amount,
            status = %tx.status,
            "gas withdrawal requested"
        );
        Ok((account, tx))
    }

    /// Settles or fails a pending withdrawal.
    pub async fn complete_withdrawal(
        &self,
        tx_id: Uuid,
        success: bool,
        error_message: &str,
    ) -> LedgerResult<Applied> {
        let this = self.clone();
        let error_message = error_message.trim().to_string();
        self.detached(async move {
            let _guard = this.inner.tx_locks.lock(&tx_id).await;
            let mut tx = this.inner.store.get_gas_transaction(tx_id).await?;
            if !tx.is_withdrawal() {
                return Err(LedgerError::validation(format!(
                    "transaction {tx_id} is not a withdrawal"
                )));
            }

            let now = Utc::now();
            tx.resolved_at = Some(now);
            tx.next_attempt_at = None;
            let event = if success {
                tx.completed_at = Some(now);
                tx.error = None;
                WithdrawalEvent::Settled
            } else {
                tx.net_amount = Decimal::ZERO;
                tx.error = Some(if error_message.is_empty() {
                    "withdrawal failed".to_string()
                } else {
                    error_message
                });
                WithdrawalEvent::SettlementFailed
            };

            let applied = this.apply_event(tx, event).await?;
            info!(
                transaction_id = %tx_id,
                status = %applied.transaction.status,
                "gas withdrawal resolved"
            );
            Ok(applied)
        })
        .await
    }

    /// Cancels a withdrawal that has not settled yet and hands the funds back.
    pub async fn cancel_withdrawal(
        &self,
        owner: &str,
        tx_id: Uuid,
        reason: &str,
    ) -> LedgerResult<Applied> {
        let owner = required(owner, "account_id")?;
        let this = self.clone();
        let reason = reason.trim().to_string();
        self.detached(async move {
            let _guard = this.inner.tx_locks.lock(&tx_id).await;
            let mut tx = this.owned_withdrawal(&owner, tx_id).await?;
            let was_scheduled = tx.status == TransactionStatus::Scheduled;

            tx.net_amount = Decimal::ZERO;
            tx.resolved_at = Some(Utc::now());
            tx.error = Some(if reason.is_empty() {
                "cancelled by owner".to_string()
            } else {
                reason
            });
            let applied = this.apply_event(tx, WithdrawalEvent::Cancelled).await?;

            if was_scheduled {
                if let Err(err) = this.inner.store.delete_withdrawal_schedule(tx_id).await {
                    warn!(transaction_id = %tx_id, error = %err, "failed to delete withdrawal schedule");
                }
            }
            info!(transaction_id = %tx_id, account_id = %owner, "gas withdrawal cancelled");
            Ok(applied)
        })
        .await
    }

    /// A withdrawal of `owner` with its approvals attached.
    pub async fn get_withdrawal(&self, owner: &str, tx_id: Uuid) -> LedgerResult<Transaction> {
        let owner = required(owner, "account_id")?;
        let mut tx = self.owned_withdrawal(&owner, tx_id).await?;
        tx.approvals = self.inner.store.list_withdrawal_approvals(tx_id).await?;
        Ok(tx)
    }

    pub async fn list_transactions(
        &self,
        gas_account_id: Uuid,
        limit: usize,
    ) -> LedgerResult<Vec<Transaction>> {
        self.list_transactions_filtered(gas_account_id, None, None, limit)
            .await
    }

    /// Newest first. Filters are applied before the limit.
    pub async fn list_transactions_filtered(
        &self,
        gas_account_id: Uuid,
        tx_type: Option<TransactionType>,
        status: Option<TransactionStatus>,
        limit: usize,
    ) -> LedgerResult<Vec<Transaction>> {
        let limit = self.clamp_limit(limit);
        let filtered = tx_type.is_some() || status.is_some();
        let fetch = if filtered {
            self.inner.config.max_list_limit
        } else {
            limit
        };

        let mut txs = self
            .inner
            .store
            .list_gas_transactions(gas_account_id, fetch)
            .await?;
        txs.retain(|tx| {
            tx_type.map_or(true, |ty| tx.tx_type == ty) && status.map_or(true, |s| tx.status == s)
        });
        txs.truncate(limit);
        Ok(txs)
    }

    pub(super) async fn owned_withdrawal(
        &self,
        owner: &str,
        tx_id: Uuid,
    ) -> LedgerResult<Transaction> {
        let tx = self.owned_transaction(owner, tx_id).await?;
        if !tx.is_withdrawal() {
            return Err(LedgerError::not_found(format!("withdrawal {tx_id}")));
        }
        Ok(tx)
    }
}
