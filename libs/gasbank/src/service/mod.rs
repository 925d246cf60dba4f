//! The ledger service: every balance-mutating operation and the withdrawal
//! lifecycle built on top of a [`Store`].
//!
//! Read-modify-write sequences on an account run under a per-account lock,
//! changes to a transaction under a per-transaction lock (always taken
//! first). Sequences that move balances are driven to completion on a
//! spawned task, so a caller that goes away mid-call cannot leave an
//! account half updated.

mod accounts;
mod approvals;
mod dead_letters;
mod schedules;
mod withdrawals;

use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::fees::FEE_UNIT_SCALE;
use crate::locks::KeyedLocks;
use crate::state::{Transition, WithdrawalEvent};
use crate::store::Store;
use crate::types::{GasAccount, Transaction};

pub use accounts::{AccountSummary, EnsureAccountOptions, Summary, TransactionBrief};
pub use withdrawals::WithdrawOptions;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub default_list_limit: usize,
    pub max_list_limit: usize,
    pub activation_batch: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_list_limit: 25,
            max_list_limit: 500,
            activation_batch: 50,
        }
    }
}

#[derive(Clone)]
pub struct LedgerService {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn Store>,
    config: LedgerConfig,
    owner_locks: KeyedLocks<String>,
    account_locks: KeyedLocks<Uuid>,
    tx_locks: KeyedLocks<Uuid>,
}

/// Outcome of moving a withdrawal through the state machine.
#[derive(Debug, Clone, Serialize)]
pub struct Applied {
    /// The owning account after the move, when its balances changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<GasAccount>,
    pub transaction: Transaction,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: LedgerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                owner_locks: KeyedLocks::new(),
                account_locks: KeyedLocks::new(),
                tx_locks: KeyedLocks::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.inner.config
    }

    fn clamp_limit(&self, limit: usize) -> usize {
        let config = &self.inner.config;
        if limit == 0 {
            config.default_list_limit
        } else {
            limit.min(config.max_list_limit)
        }
    }

    /// Runs `work` on its own task and waits for it. Dropping the returned
    /// future does not cancel `work`.
    async fn detached<T, F>(&self, work: F) -> LedgerResult<T>
    where
        T: Send + 'static,
        F: Future<Output = LedgerResult<T>> + Send + 'static,
    {
        tokio::spawn(work)
            .await
            .map_err(|err| LedgerError::Internal(format!("ledger task aborted: {err}")))?
    }

    /// Persists an account after checking the balance invariants.
    async fn save_account(&self, account: GasAccount) -> LedgerResult<GasAccount> {
        account.check_invariants().map_err(LedgerError::Invariant)?;
        Ok(self.inner.store.update_gas_account(account).await?)
    }

    /// Read-modify-write of one account under its lock. Nothing is written
    /// when `change` fails.
    pub(crate) async fn update_account<F>(
        &self,
        gas_account_id: Uuid,
        change: F,
    ) -> LedgerResult<GasAccount>
    where
        F: FnOnce(&mut GasAccount) -> LedgerResult<()> + Send + 'static,
    {
        let this = self.clone();
        self.detached(async move {
            let _guard = this.inner.account_locks.lock(&gas_account_id).await;
            let mut account = this.inner.store.get_gas_account(gas_account_id).await?;
            change(&mut account)?;
            this.save_account(account).await
        })
        .await
    }

    /// Writes back the pre-image of an account after a failed follow-up write.
    async fn restore_account(&self, original: GasAccount, after: &str) {
        let id = original.id;
        match self.inner.store.update_gas_account(original).await {
            Ok(_) => warn!(gas_account_id = %id, "gas account restored after {after} failure"),
            Err(err) => error!(
                gas_account_id = %id,
                error = %err,
                "failed to rollback gas account after {after} failure"
            ),
        }
    }

    /// Loads a transaction on behalf of `owner`. Foreign transactions are
    /// reported exactly like missing ones.
    async fn owned_transaction(&self, owner: &str, tx_id: Uuid) -> LedgerResult<Transaction> {
        let tx = self.inner.store.get_gas_transaction(tx_id).await?;
        if tx.user_account_id != owner {
            warn!(
                transaction_id = %tx_id,
                account_id = owner,
                "rejected access to transaction of another account"
            );
            return Err(LedgerError::not_found(format!("transaction {tx_id}")));
        }
        Ok(tx)
    }

    /// Moves a withdrawal through `event` and persists the result. Fields the
    /// caller set on `tx` besides `status` are written along with it.
    ///
    /// The caller must hold the transaction lock. When the transition moves
    /// funds, the account lock is taken here and the account write is undone
    /// if the transaction write fails.
    async fn apply_event(&self, mut tx: Transaction, event: WithdrawalEvent) -> LedgerResult<Applied> {
        let Transition { to, effect, .. } = tx.status.apply(event)?;

        if !effect.touches_balances() {
            tx.status = to;
            let transaction = self.inner.store.update_gas_transaction(tx).await?;
            return Ok(Applied {
                account: None,
                transaction,
            });
        }

        let _account_guard = self.inner.account_locks.lock(&tx.account_id).await;
        let original = self.inner.store.get_gas_account(tx.account_id).await?;
        let mut account = original.clone();
        effect.apply(&mut account, tx.amount)?;
        let account = self.save_account(account).await?;

        tx.status = to;
        match self.inner.store.update_gas_transaction(tx).await {
            Ok(transaction) => Ok(Applied {
                account: Some(account),
                transaction,
            }),
            Err(err) => {
                self.restore_account(original, "withdrawal transition").await;
                Err(err.into())
            }
        }
    }
}

/// Amounts must be positive and representable in the smallest chain unit.
pub(crate) fn check_amount(amount: Decimal) -> LedgerResult<()> {
    if amount <= Decimal::ZERO || amount.normalize().scale() > FEE_UNIT_SCALE {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(())
}

pub(crate) fn required(value: &str, name: &str) -> LedgerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::validation(format!("{name} required")));
    }
    Ok(trimmed.to_string())
}
