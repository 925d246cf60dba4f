use chrono::{DateTime, Utc};
use diesel::prelude::*;
use gasbank::WithdrawalSchedule;
use uuid::Uuid;

use crate::schema::gas_withdrawal_schedules;

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = gas_withdrawal_schedules)]
#[diesel(primary_key(transaction_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct ScheduleRow {
    pub transaction_id: Uuid,
    pub schedule_at: DateTime<Utc>,
    pub cron_expression: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&WithdrawalSchedule> for ScheduleRow {
    fn from(schedule: &WithdrawalSchedule) -> Self {
        Self {
            transaction_id: schedule.transaction_id,
            schedule_at: schedule.schedule_at,
            cron_expression: schedule.cron_expression.clone(),
            next_run_at: schedule.next_run_at,
            last_run_at: schedule.last_run_at,
            created_at: schedule.created_at,
            updated_at: schedule.updated_at,
        }
    }
}

impl From<ScheduleRow> for WithdrawalSchedule {
    fn from(row: ScheduleRow) -> Self {
        Self {
            transaction_id: row.transaction_id,
            schedule_at: row.schedule_at,
            cron_expression: row.cron_expression,
            next_run_at: row.next_run_at,
            last_run_at: row.last_run_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
