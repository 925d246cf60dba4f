use chrono::{DateTime, Utc};
use diesel::prelude::*;
use gasbank::{Approval, StoreResult};
use uuid::Uuid;

use super::parse_column;
use crate::schema::gas_withdrawal_approvals;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = gas_withdrawal_approvals)]
#[diesel(primary_key(transaction_id, approver))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct ApprovalRow {
    pub transaction_id: Uuid,
    pub approver: String,
    pub status: String,
    pub signature: Option<String>,
    pub note: Option<String>,
    pub decided_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Approval> for ApprovalRow {
    fn from(approval: &Approval) -> Self {
        Self {
            transaction_id: approval.transaction_id,
            approver: approval.approver.clone(),
            status: approval.status.as_str().to_string(),
            signature: approval.signature.clone(),
            note: approval.note.clone(),
            decided_at: approval.decided_at,
            created_at: approval.created_at,
            updated_at: approval.updated_at,
        }
    }
}

impl ApprovalRow {
    pub fn into_approval(self) -> StoreResult<Approval> {
        Ok(Approval {
            transaction_id: self.transaction_id,
            approver: self.approver,
            status: parse_column(&self.status)?,
            signature: self.signature,
            note: self.note,
            decided_at: self.decided_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
