use chrono::{DateTime, Utc};
use diesel::prelude::*;
use gasbank::{GasAccount, StoreResult};
use uuid::Uuid;

use super::{from_count, from_units, to_count, to_units};
use crate::schema::gas_accounts;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = gas_accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct GasAccountRow {
    pub id: Uuid,
    pub account_id: String,
    pub wallet_address: String,
    pub balance: i64,
    pub available: i64,
    pub pending: i64,
    pub locked: i64,
    pub min_balance: i64,
    pub daily_limit: i64,
    pub daily_withdrawal: i64,
    pub notification_threshold: i64,
    pub required_approvals: i32,
    pub last_withdrawal: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GasAccountRow {
    pub fn from_account(account: &GasAccount) -> StoreResult<Self> {
        Ok(Self {
            id: account.id,
            account_id: account.account_id.clone(),
            wallet_address: gasbank::normalize_wallet_address(&account.wallet_address),
            balance: to_units(account.balance)?,
            available: to_units(account.available)?,
            pending: to_units(account.pending)?,
            locked: to_units(account.locked)?,
            min_balance: to_units(account.min_balance)?,
            daily_limit: to_units(account.daily_limit)?,
            daily_withdrawal: to_units(account.daily_withdrawal)?,
            notification_threshold: to_units(account.notification_threshold)?,
            required_approvals: to_count(account.required_approvals)?,
            last_withdrawal: account.last_withdrawal,
            created_at: account.created_at,
            updated_at: account.updated_at,
        })
    }

    pub fn into_account(self) -> StoreResult<GasAccount> {
        Ok(GasAccount {
            id: self.id,
            account_id: self.account_id,
            wallet_address: self.wallet_address,
            balance: from_units(self.balance),
            available: from_units(self.available),
            pending: from_units(self.pending),
            locked: from_units(self.locked),
            min_balance: from_units(self.min_balance),
            daily_limit: from_units(self.daily_limit),
            daily_withdrawal: from_units(self.daily_withdrawal),
            notification_threshold: from_units(self.notification_threshold),
            required_approvals: from_count(self.required_approvals)?,
            last_withdrawal: self.last_withdrawal,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
