use chrono::{DateTime, Utc};
use diesel::prelude::*;
use gasbank::{DeadLetter, StoreResult};
use uuid::Uuid;

use super::{from_count, to_count};
use crate::schema::gas_dead_letters;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = gas_dead_letters)]
#[diesel(primary_key(transaction_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct DeadLetterRow {
    pub transaction_id: Uuid,
    pub account_id: String,
    pub gas_account_id: Uuid,
    pub reason: String,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub retries: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeadLetterRow {
    pub fn from_entry(entry: &DeadLetter) -> StoreResult<Self> {
        Ok(Self {
            transaction_id: entry.transaction_id,
            account_id: entry.account_id.clone(),
            gas_account_id: entry.gas_account_id,
            reason: entry.reason.clone(),
            last_error: entry.last_error.clone(),
            last_attempt_at: entry.last_attempt_at,
            retries: to_count(entry.retries)?,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        })
    }

    pub fn into_entry(self) -> StoreResult<DeadLetter> {
        Ok(DeadLetter {
            transaction_id: self.transaction_id,
            account_id: self.account_id,
            gas_account_id: self.gas_account_id,
            reason: self.reason,
            last_error: self.last_error,
            last_attempt_at: self.last_attempt_at,
            retries: from_count(self.retries)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
