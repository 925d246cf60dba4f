use crate::state::{TransactionStatus, WithdrawalEvent};

pub type StoreResult<T> = Result<T, StoreError>;
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Failures reported by a [`crate::Store`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("amount must be positive with at most 8 decimal places")]
    InvalidAmount,

    #[error("{0}")]
    Validation(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("insufficient funds to maintain minimum balance")]
    MinBalance,

    #[error("daily withdrawal limit exceeded")]
    DailyLimit,

    #[error("wallet address already assigned to another account")]
    WalletInUse,

    #[error("cron expressions are not supported yet; use schedule_at for deferred withdrawals")]
    CronUnsupported,

    /// Missing records and records owned by someone else are reported the same way.
    #[error("{0} not found")]
    NotFound(String),

    #[error("transaction in status {from} cannot accept {event}")]
    InvalidTransition {
        from: TransactionStatus,
        event: WithdrawalEvent,
    },

    #[error("balance invariant violated: {0}")]
    Invariant(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// True for errors the caller caused by violating an account policy.
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds
                | Self::MinBalance
                | Self::DailyLimit
                | Self::WalletInUse
                | Self::CronUnsupported
        )
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Store(other),
        }
    }
}
