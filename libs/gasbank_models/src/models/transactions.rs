use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use gasbank::{ApprovalPolicy, StoreError, StoreResult, Transaction};
use uuid::Uuid;

use super::{from_count, from_units, parse_column, to_count, to_units};
use crate::schema::gas_transactions;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = gas_transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct GasTransactionRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub user_account_id: String,
    pub tx_type: String,
    pub amount: i64,
    pub net_amount: i64,
    pub status: String,
    pub blockchain_tx_id: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub notes: Option<String>,
    pub error: Option<String>,
    pub schedule_at: Option<DateTime<Utc>>,
    pub cron_expression: Option<String>,
    pub required_approvals: i32,
    pub resolver_attempt: i32,
    pub resolver_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub dead_letter_reason: Option<String>,
    pub metadata: serde_json::Value,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GasTransactionRow {
    pub fn from_transaction(tx: &Transaction) -> StoreResult<Self> {
        let metadata = serde_json::to_value(&tx.metadata)
            .map_err(|e| StoreError::backend(format!("encode metadata: {e}")))?;
        Ok(Self {
            id: tx.id,
            account_id: tx.account_id,
            user_account_id: tx.user_account_id.clone(),
            tx_type: tx.tx_type.as_str().to_string(),
            amount: to_units(tx.amount)?,
            net_amount: to_units(tx.net_amount)?,
            status: tx.status.as_str().to_string(),
            blockchain_tx_id: tx.blockchain_tx_id.clone(),
            from_address: tx.from_address.clone(),
            to_address: tx.to_address.clone(),
            notes: tx.notes.clone(),
            error: tx.error.clone(),
            schedule_at: tx.schedule_at,
            cron_expression: tx.cron_expression.clone(),
            required_approvals: to_count(tx.approval_policy.required)?,
            resolver_attempt: to_count(tx.resolver_attempt)?,
            resolver_error: tx.resolver_error.clone(),
            last_attempt_at: tx.last_attempt_at,
            next_attempt_at: tx.next_attempt_at,
            dead_letter_reason: tx.dead_letter_reason.clone(),
            metadata,
            dispatched_at: tx.dispatched_at,
            resolved_at: tx.resolved_at,
            completed_at: tx.completed_at,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        })
    }

    pub fn into_transaction(self) -> StoreResult<Transaction> {
        let metadata: BTreeMap<String, String> = if self.metadata.is_null() {
            BTreeMap::new()
        } else {
            serde_json::from_value(self.metadata)
                .map_err(|e| StoreError::backend(format!("decode metadata: {e}")))?
        };
        Ok(Transaction {
            id: self.id,
            account_id: self.account_id,
            user_account_id: self.user_account_id,
            tx_type: parse_column(&self.tx_type)?,
            amount: from_units(self.amount),
            net_amount: from_units(self.net_amount),
            status: parse_column(&self.status)?,
            blockchain_tx_id: self.blockchain_tx_id,
            from_address: self.from_address,
            to_address: self.to_address,
            notes: self.notes,
            error: self.error,
            schedule_at: self.schedule_at,
            cron_expression: self.cron_expression,
            approval_policy: ApprovalPolicy {
                required: from_count(self.required_approvals)?,
            },
            resolver_attempt: from_count(self.resolver_attempt)?,
            resolver_error: self.resolver_error,
            last_attempt_at: self.last_attempt_at,
            next_attempt_at: self.next_attempt_at,
            dead_letter_reason: self.dead_letter_reason,
            metadata,
            dispatched_at: self.dispatched_at,
            resolved_at: self.resolved_at,
            completed_at: self.completed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            approvals: Vec::new(),
        })
    }
}
