//! Custodial gas-token ledger.
//!
//! Tracks deposits and withdrawals per account across four balance fields,
//! gates withdrawals behind approval and spending policy, defers scheduled
//! withdrawals and drives settlement with a dead-letter escape hatch. The
//! ledger records intent and outcome only; moving funds on chain is somebody
//! else's job.

pub mod error;
pub mod fees;
pub mod locks;
pub mod memory;
pub mod settlement;
pub mod state;
pub mod store;
pub mod types;

mod service;

pub use error::{LedgerError, LedgerResult, StoreError, StoreResult};
pub use fees::FeeCollector;
pub use memory::MemoryStore;
pub use service::{
    AccountSummary, Applied, EnsureAccountOptions, LedgerConfig, LedgerService, Summary,
    TransactionBrief, WithdrawOptions,
};
pub use settlement::{
    Resolution, ResolverError, SettlementPoller, TickReport, TimeoutResolver, WithdrawalResolver,
};
pub use state::{BalanceEffect, TransactionStatus, Transition, WithdrawalEvent};
pub use store::Store;
pub use types::{
    normalize_wallet_address, Approval, ApprovalPolicy, ApprovalStatus, AttemptStatus, DeadLetter,
    GasAccount, NewSettlementAttempt, SettlementAttempt, Transaction, TransactionType,
    WithdrawalSchedule,
};
