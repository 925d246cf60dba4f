use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::LedgerService;
use crate::error::LedgerResult;
use crate::state::{TransactionStatus, WithdrawalEvent};
use crate::types::WithdrawalSchedule;

impl LedgerService {
    /// Releases scheduled withdrawals whose time has come and returns how
    /// many were activated. `limit == 0` uses the configured batch size.
    ///
    /// A schedule that cannot be processed is logged and left for the next
    /// run; it never aborts the batch.
    pub async fn activate_due_schedules(&self, limit: usize) -> LedgerResult<usize> {
        let limit = if limit == 0 {
            self.inner.config.activation_batch
        } else {
            limit
        };
        let due = self
            .inner
            .store
            .list_due_withdrawal_schedules(Utc::now(), limit)
            .await?;

        let mut activated = 0;
        for schedule in due {
            let tx_id = schedule.transaction_id;
            match self.activate_schedule(schedule).await {
                Ok(true) => activated += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(transaction_id = %tx_id, error = %err, "failed to activate scheduled withdrawal")
                }
            }
        }
        if activated > 0 {
            info!(activated, "scheduled withdrawals activated");
        }
        Ok(activated)
    }

    /// Calls [`Self::activate_due_schedules`] every `interval` until
    /// `shutdown` flips to true or its sender goes away.
    pub async fn run_schedule_activator(
        &self,
        interval: Duration,
        batch: usize,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "schedule activator started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.activate_due_schedules(batch).await {
                        warn!(error = %err, "activate due schedules failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("schedule activator stopped");
    }

    async fn activate_schedule(&self, schedule: WithdrawalSchedule) -> LedgerResult<bool> {
        let store = &self.inner.store;
        let tx_id = schedule.transaction_id;
        let _guard = self.inner.tx_locks.lock(&tx_id).await;
        let tx = store.get_gas_transaction(tx_id).await?;

        if tx.status != TransactionStatus::Scheduled {
            debug!(transaction_id = %tx_id, status = %tx.status, "dropping stale withdrawal schedule");
            store.delete_withdrawal_schedule(tx_id).await?;
            return Ok(false);
        }

        let account = store.get_gas_account(tx.account_id).await?;
        let requires_approval = tx.required_approvals(&account) > 0;
        self.apply_event(tx, WithdrawalEvent::Activate { requires_approval })
            .await?;

        if let Err(err) = store.delete_withdrawal_schedule(tx_id).await {
            warn!(transaction_id = %tx_id, error = %err, "failed to delete withdrawal schedule");
        }
        Ok(true)
    }
}
