//! Withdrawal state machine.
//!
//! Every status change a withdrawal can go through is listed once in
//! [`TransactionStatus::apply`], together with what it does to the owning
//! account's balance fields.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::types::{GasAccount, ParseEnumError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Scheduled,
    AwaitingApproval,
    Pending,
    Completed,
    Failed,
    Cancelled,
    DeadLetter,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::DeadLetter => "dead_letter",
        }
    }

    /// Withdrawals in these states still hold funds that have not settled.
    pub fn is_active_withdrawal(&self) -> bool {
        matches!(self, Self::Scheduled | Self::AwaitingApproval | Self::Pending)
    }

    /// Status a withdrawal enters once it is released for processing.
    pub fn released(requires_approval: bool) -> Self {
        if requires_approval {
            Self::AwaitingApproval
        } else {
            Self::Pending
        }
    }

    pub fn apply(self, event: WithdrawalEvent) -> LedgerResult<Transition> {
        use TransactionStatus as S;
        use WithdrawalEvent as E;

        let (to, effect) = match (self, event) {
            (S::Scheduled, E::Activate { requires_approval }) => {
                (S::released(requires_approval), BalanceEffect::None)
            }
            (S::AwaitingApproval, E::ApprovalsReached) => (S::Pending, BalanceEffect::None),
            (S::AwaitingApproval, E::Rejected) => (S::Cancelled, BalanceEffect::Release),
            (S::Pending, E::Settled) => (S::Completed, BalanceEffect::Settle),
            (S::Pending, E::SettlementFailed) => (S::Failed, BalanceEffect::Release),
            (S::Pending, E::DeadLettered) => (S::DeadLetter, BalanceEffect::None),
            // Funds were handed back on failure; hold them again so the
            // parked withdrawal can still settle after a retry.
            (S::Failed, E::DeadLettered) => (S::DeadLetter, BalanceEffect::Reserve),
            (S::DeadLetter, E::Retried) => (S::Pending, BalanceEffect::None),
            (S::Scheduled | S::AwaitingApproval | S::Pending, E::Cancelled) => {
                (S::Cancelled, BalanceEffect::Release)
            }
            (from, event) => return Err(LedgerError::InvalidTransition { from, event }),
        };
        Ok(Transition {
            from: self,
            to,
            effect,
        })
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scheduled" => Ok(Self::Scheduled),
            "awaiting_approval" => Ok(Self::AwaitingApproval),
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "dead_letter" => Ok(Self::DeadLetter),
            other => Err(ParseEnumError {
                kind: "transaction status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalEvent {
    Activate { requires_approval: bool },
    ApprovalsReached,
    Rejected,
    Settled,
    SettlementFailed,
    DeadLettered,
    Retried,
    Cancelled,
}

impl fmt::Display for WithdrawalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Activate { .. } => "activate",
            Self::ApprovalsReached => "approvals reached",
            Self::Rejected => "reject",
            Self::Settled => "settle",
            Self::SettlementFailed => "settlement failure",
            Self::DeadLettered => "dead letter",
            Self::Retried => "retry",
            Self::Cancelled => "cancel",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
    pub effect: BalanceEffect,
}

/// How a transition moves an amount between an account's balance fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    None,
    /// `available -> pending`
    Reserve,
    /// `pending -> available`
    Release,
    /// `pending` and `balance` both drop: the funds have left the books.
    Settle,
}

impl BalanceEffect {
    pub fn touches_balances(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Applies the effect, leaving `account` untouched if any field would go negative.
    pub fn apply(&self, account: &mut GasAccount, amount: Decimal) -> LedgerResult<()> {
        match self {
            Self::None => {}
            Self::Reserve => {
                if account.available < amount {
                    return Err(LedgerError::InsufficientFunds);
                }
                account.available -= amount;
                account.pending += amount;
            }
            Self::Release => {
                if account.pending < amount {
                    return Err(LedgerError::Invariant(format!(
                        "pending {} cannot release {amount}",
                        account.pending
                    )));
                }
                account.pending -= amount;
                account.available += amount;
            }
            Self::Settle => {
                if account.pending < amount || account.balance < amount {
                    return Err(LedgerError::Invariant(format!(
                        "pending {} / balance {} cannot settle {amount}",
                        account.pending, account.balance
                    )));
                }
                account.pending -= amount;
                account.balance -= amount;
            }
        }
        Ok(())
    }
}
