use chrono::{DateTime, Utc};
use diesel::prelude::*;
use gasbank::{SettlementAttempt, StoreResult};
use uuid::Uuid;

use super::{from_count, parse_column, to_count};
use crate::schema::gas_settlement_attempts;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = gas_settlement_attempts)]
#[diesel(primary_key(transaction_id, attempt))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct SettlementAttemptRow {
    pub transaction_id: Uuid,
    pub attempt: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub latency_ms: i64,
    pub status: String,
    pub error: Option<String>,
}

impl SettlementAttemptRow {
    pub fn from_attempt(attempt: &SettlementAttempt) -> StoreResult<Self> {
        Ok(Self {
            transaction_id: attempt.transaction_id,
            attempt: to_count(attempt.attempt)?,
            started_at: attempt.started_at,
            completed_at: attempt.completed_at,
            latency_ms: attempt.latency_ms,
            status: attempt.status.as_str().to_string(),
            error: attempt.error.clone(),
        })
    }

    pub fn into_attempt(self) -> StoreResult<SettlementAttempt> {
        Ok(SettlementAttempt {
            transaction_id: self.transaction_id,
            attempt: from_count(self.attempt)?,
            started_at: self.started_at,
            completed_at: self.completed_at,
            latency_ms: self.latency_ms,
            status: parse_column(&self.status)?,
            error: self.error,
        })
    }
}
