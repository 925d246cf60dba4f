use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use super::{required, LedgerService};
use crate::error::{LedgerError, LedgerResult};
use crate::state::{TransactionStatus, WithdrawalEvent};
use crate::types::{non_empty, Approval, ApprovalStatus, Transaction};

impl LedgerService {
    /// Records one approver's vote and re-evaluates the withdrawal.
    ///
    /// Votes are upserted per approver, so a later vote replaces an earlier
    /// one. A rejection cancels a withdrawal still awaiting approval; once
    /// enough approvals are in, the withdrawal moves to `pending`. Votes on a
    /// withdrawal in any other status are only recorded.
    pub async fn submit_approval(
        &self,
        tx_id: Uuid,
        approver: &str,
        signature: &str,
        note: &str,
        approve: bool,
    ) -> LedgerResult<(Approval, Transaction)> {
        let approver = required(approver, "approver")?;
        let (signature, note) = (non_empty(signature), non_empty(note));
        let this = self.clone();
        self.detached(async move {
            let store = &this.inner.store;
            let _guard = this.inner.tx_locks.lock(&tx_id).await;
            let tx = store.get_gas_transaction(tx_id).await?;
            if !tx.is_withdrawal() {
                return Err(LedgerError::validation(format!(
                    "transaction {tx_id} is not a withdrawal"
                )));
            }

            let now = Utc::now();
            let approval = store
                .upsert_withdrawal_approval(Approval {
                    transaction_id: tx_id,
                    approver: approver.clone(),
                    status: if approve {
                        ApprovalStatus::Approved
                    } else {
                        ApprovalStatus::Rejected
                    },
                    signature,
                    note,
                    decided_at: now,
                    created_at: now,
                    updated_at: now,
                })
                .await?;

            let mut tx = if tx.status != TransactionStatus::AwaitingApproval {
                tx
            } else if !approve {
                let mut tx = tx;
                tx.net_amount = Decimal::ZERO;
                tx.resolved_at = Some(now);
                tx.error = Some(format!("rejected by {approver}"));
                let applied = this.apply_event(tx, WithdrawalEvent::Rejected).await?;
                info!(transaction_id = %tx_id, approver = %approver, "gas withdrawal rejected");
                applied.transaction
            } else {
                let account = store.get_gas_account(tx.account_id).await?;
                let needed = tx.required_approvals(&account) as usize;
                let approved = store
                    .list_withdrawal_approvals(tx_id)
                    .await?
                    .iter()
                    .filter(|vote| vote.status == ApprovalStatus::Approved)
                    .count();
                if approved >= needed {
                    let applied = this.apply_event(tx, WithdrawalEvent::ApprovalsReached).await?;
                    info!(
                        transaction_id = %tx_id,
                        approvals = approved,
                        "gas withdrawal approved"
                    );
                    applied.transaction
                } else {
                    tx
                }
            };

            tx.approvals = store.list_withdrawal_approvals(tx_id).await?;
            Ok((approval, tx))
        })
        .await
    }

    /// Votes on a withdrawal, most recent decision first.
    pub async fn list_approvals(&self, tx_id: Uuid) -> LedgerResult<Vec<Approval>> {
        Ok(self.inner.store.list_withdrawal_approvals(tx_id).await?)
    }
}
