use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::TransactionStatus;

/// Raised when a persisted enum column holds a value this crate does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Lower-cases and trims a wallet address so lookups are case-insensitive.
pub fn normalize_wallet_address(wallet: &str) -> String {
    wallet.trim().to_lowercase()
}

/// A funding account held on behalf of one owner.
///
/// `balance` is everything on the books; `available`, `pending` and `locked`
/// partition what has not been settled out yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasAccount {
    pub id: Uuid,
    pub account_id: String,
    pub wallet_address: String,
    pub balance: Decimal,
    pub available: Decimal,
    pub pending: Decimal,
    pub locked: Decimal,
    pub min_balance: Decimal,
    pub daily_limit: Decimal,
    pub daily_withdrawal: Decimal,
    pub notification_threshold: Decimal,
    pub required_approvals: u32,
    pub last_withdrawal: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GasAccount {
    pub fn new(account_id: impl Into<String>, wallet_address: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.into(),
            wallet_address: normalize_wallet_address(wallet_address),
            balance: Decimal::ZERO,
            available: Decimal::ZERO,
            pending: Decimal::ZERO,
            locked: Decimal::ZERO,
            min_balance: Decimal::ZERO,
            daily_limit: Decimal::ZERO,
            daily_withdrawal: Decimal::ZERO,
            notification_threshold: Decimal::ZERO,
            required_approvals: 0,
            last_withdrawal: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Withdrawals already counted against today's limit. The accumulator
    /// resets when the UTC day of `now` differs from the last withdrawal.
    pub fn daily_used(&self, now: DateTime<Utc>) -> Decimal {
        match self.last_withdrawal {
            Some(last) if last.date_naive() == now.date_naive() => self.daily_withdrawal,
            _ => Decimal::ZERO,
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        for (name, value) in [
            ("balance", self.balance),
            ("available", self.available),
            ("pending", self.pending),
            ("locked", self.locked),
        ] {
            if value < Decimal::ZERO {
                return Err(format!("{name} is negative ({value})"));
            }
        }
        if self.available + self.pending > self.balance {
            return Err(format!(
                "available {} + pending {} exceeds balance {}",
                self.available, self.pending, self.balance
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            other => Err(ParseEnumError {
                kind: "transaction type",
                value: other.to_string(),
            }),
        }
    }
}

/// Approval requirements captured when a withdrawal is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub required: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    /// Gas account the funds belong to.
    pub account_id: Uuid,
    /// Owner that requested the transaction.
    pub user_account_id: String,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub net_amount: Decimal,
    pub status: TransactionStatus,
    pub blockchain_tx_id: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub notes: Option<String>,
    pub error: Option<String>,
    pub schedule_at: Option<DateTime<Utc>>,
    pub cron_expression: Option<String>,
    pub approval_policy: ApprovalPolicy,
    pub resolver_attempt: u32,
    pub resolver_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub dead_letter_reason: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Hydrated on read for withdrawals; never persisted with the row.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approvals: Vec<Approval>,
}

impl Transaction {
    fn blank(account: &GasAccount, tx_type: TransactionType, amount: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            account_id: account.id,
            user_account_id: account.account_id.clone(),
            tx_type,
            amount,
            net_amount: amount,
            status: TransactionStatus::Pending,
            blockchain_tx_id: None,
            from_address: None,
            to_address: None,
            notes: None,
            error: None,
            schedule_at: None,
            cron_expression: None,
            approval_policy: ApprovalPolicy::default(),
            resolver_attempt: 0,
            resolver_error: None,
            last_attempt_at: None,
            next_attempt_at: None,
            dead_letter_reason: None,
            metadata: BTreeMap::new(),
            dispatched_at: None,
            resolved_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            approvals: Vec::new(),
        }
    }

    /// A deposit settles synchronously, so it is created `completed`.
    pub fn deposit(
        account: &GasAccount,
        amount: Decimal,
        blockchain_tx_id: &str,
        from: &str,
        to: &str,
    ) -> Self {
        let mut tx = Self::blank(account, TransactionType::Deposit, amount);
        tx.status = TransactionStatus::Completed;
        tx.blockchain_tx_id = non_empty(blockchain_tx_id);
        tx.from_address = non_empty(from);
        tx.to_address = non_empty(to);
        tx.completed_at = Some(tx.created_at);
        tx
    }

    pub fn withdrawal(
        account: &GasAccount,
        amount: Decimal,
        to: &str,
        status: TransactionStatus,
        schedule_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut tx = Self::blank(account, TransactionType::Withdrawal, amount);
        tx.status = status;
        tx.to_address = non_empty(to);
        tx.schedule_at = schedule_at;
        tx.approval_policy = ApprovalPolicy {
            required: account.required_approvals,
        };
        tx
    }

    pub fn is_withdrawal(&self) -> bool {
        self.tx_type == TransactionType::Withdrawal
    }

    /// Approvals needed to release this withdrawal, preferring the snapshot
    /// taken at creation over the account's current setting.
    pub fn required_approvals(&self, account: &GasAccount) -> u32 {
        if self.approval_policy.required > 0 {
            self.approval_policy.required
        } else {
            account.required_approvals
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseEnumError {
                kind: "approval status",
                value: other.to_string(),
            }),
        }
    }
}

/// One approver's vote on a withdrawal, unique per (transaction, approver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub transaction_id: Uuid,
    pub approver: String,
    pub status: ApprovalStatus,
    pub signature: Option<String>,
    pub note: Option<String>,
    pub decided_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalSchedule {
    pub transaction_id: Uuid,
    pub schedule_at: DateTime<Utc>,
    pub cron_expression: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalSchedule {
    pub fn once(transaction_id: Uuid, schedule_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            transaction_id,
            schedule_at,
            cron_expression: None,
            next_run_at: Some(schedule_at),
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Succeeded,
    Failed,
    Retry,
    Error,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Retry => "retry",
            Self::Error => "error",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl FromStr for AttemptStatus {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "retry" => Ok(Self::Retry),
            "error" => Ok(Self::Error),
            other => Err(ParseEnumError {
                kind: "attempt status",
                value: other.to_string(),
            }),
        }
    }
}

/// A settlement try as reported by the settlement worker. Missing fields are
/// filled in when the attempt is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSettlementAttempt {
    pub transaction_id: Uuid,
    pub attempt: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub latency_ms: Option<i64>,
    pub status: AttemptStatus,
    pub error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl NewSettlementAttempt {
    pub fn new(transaction_id: Uuid, status: AttemptStatus) -> Self {
        Self {
            transaction_id,
            attempt: None,
            started_at: None,
            completed_at: None,
            latency_ms: None,
            status,
            error: None,
            next_attempt_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementAttempt {
    pub transaction_id: Uuid,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub latency_ms: i64,
    pub status: AttemptStatus,
    pub error: Option<String>,
}

/// A withdrawal parked after automatic settlement gave up on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub transaction_id: Uuid,
    /// Owner of the withdrawal; checked on retry and delete.
    pub account_id: String,
    pub gas_account_id: Uuid,
    pub reason: String,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
