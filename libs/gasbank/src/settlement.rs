//! Background settlement of pending withdrawals.
//!
//! A [`WithdrawalResolver`] decides whether a pending withdrawal has settled
//! on chain. The [`SettlementPoller`] asks it about every pending withdrawal,
//! records each try, finishes withdrawals the resolver has decided on and
//! parks the ones that keep failing.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::service::LedgerService;
use crate::types::{AttemptStatus, NewSettlementAttempt, Transaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Settled,
    Failed(String),
    /// Not decided yet; ask again after `after`.
    Retry {
        after: Duration,
        message: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ResolverError(pub String);

#[async_trait]
pub trait WithdrawalResolver: Send + Sync {
    async fn resolve(&self, tx: &Transaction) -> Result<Resolution, ResolverError>;

    /// Called once a withdrawal has left `pending`. Resolvers that keep
    /// per-withdrawal state drop it here.
    fn forget(&self, _tx_id: Uuid) {}
}

const DEFAULT_RESOLVER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// When the resolver first saw a withdrawal and the last attempt count it saw.
#[derive(Debug, Clone, Copy)]
struct Sighting {
    at: Instant,
    attempt: u32,
}

/// Fails a withdrawal once it has been pending longer than `timeout` since
/// the resolver first saw it. The clock restarts when the withdrawal comes
/// back with a lower attempt count, as it does after a dead-letter retry.
pub struct TimeoutResolver {
    timeout: Duration,
    seen: Mutex<HashMap<Uuid, Sighting>>,
}

impl TimeoutResolver {
    /// A zero timeout falls back to five minutes.
    pub fn new(timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() {
            DEFAULT_RESOLVER_TIMEOUT
        } else {
            timeout
        };
        Self {
            timeout,
            seen: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl WithdrawalResolver for TimeoutResolver {
    async fn resolve(&self, tx: &Transaction) -> Result<Resolution, ResolverError> {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = Sighting {
            at: Instant::now(),
            attempt: tx.resolver_attempt,
        };
        let sighting = seen.entry(tx.id).or_insert(fresh);
        if tx.resolver_attempt < sighting.attempt {
            *sighting = fresh;
        }
        sighting.attempt = tx.resolver_attempt;
        if sighting.at.elapsed() >= self.timeout {
            seen.remove(&tx.id);
            return Ok(Resolution::Failed(
                "timeout waiting for blockchain confirmation".to_string(),
            ));
        }
        Ok(Resolution::Retry {
            after: self.timeout / 4,
            message: None,
        })
    }

    fn forget(&self, tx_id: Uuid) {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.remove(&tx_id);
    }
}

/// What one poll did, by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub settled: usize,
    pub failed: usize,
    pub retried: usize,
    pub dead_lettered: usize,
}

pub struct SettlementPoller {
    ledger: LedgerService,
    resolver: Arc<dyn WithdrawalResolver>,
    interval: Duration,
    max_attempts: u32,
    next_attempt: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl SettlementPoller {
    pub fn new(ledger: LedgerService, resolver: Arc<dyn WithdrawalResolver>) -> Self {
        Self {
            ledger,
            resolver,
            interval: Duration::from_secs(15),
            max_attempts: 5,
            next_attempt: Mutex::new(HashMap::new()),
        }
    }

    /// Zero values keep the current setting.
    pub fn with_retry_policy(mut self, max_attempts: u32, interval: Duration) -> Self {
        if max_attempts > 0 {
            self.max_attempts = max_attempts;
        }
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.interval.as_secs(),
            max_attempts = self.max_attempts,
            "gas bank settlement poller started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    debug!(?report, "settlement poll finished");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("gas bank settlement poller stopped");
    }

    /// One pass: activate due schedules, then try every pending withdrawal
    /// whose retry time has come.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        if let Err(err) = self.ledger.activate_due_schedules(0).await {
            warn!(error = %err, "activate due schedules failed");
        }
        let pending = match self.ledger.store().list_pending_withdrawals().await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "list pending withdrawals failed");
                return report;
            }
        };

        let active: HashSet<Uuid> = pending.iter().map(|tx| tx.id).collect();
        self.prune(&active);

        let now = Utc::now();
        for tx in pending {
            if let Some(at) = tx.next_attempt_at.filter(|at| *at > now) {
                self.seed_next_attempt(tx.id, at);
            }
            if !self.should_attempt(tx.id, now) {
                continue;
            }
            self.attempt(tx, &mut report).await;
        }
        report
    }

    async fn attempt(&self, tx: Transaction, report: &mut TickReport) {
        let tx_id = tx.id;
        let started_at = Utc::now();
        let outcome = self.resolver.resolve(&tx).await;
        let completed_at = Utc::now();
        let attempts = tx.resolver_attempt + 1;

        let (status, message, retry_after) = match &outcome {
            Ok(Resolution::Settled) => (AttemptStatus::Succeeded, None, None),
            Ok(Resolution::Failed(message)) => (AttemptStatus::Failed, Some(message.clone()), None),
            Ok(Resolution::Retry { after, message }) => {
                (AttemptStatus::Retry, message.clone(), Some(*after))
            }
            Err(err) => {
                warn!(transaction_id = %tx_id, error = %err, "withdrawal resolver error");
                (AttemptStatus::Error, Some(err.to_string()), None)
            }
        };

        let mut record = NewSettlementAttempt::new(tx_id, status);
        record.started_at = Some(started_at);
        record.completed_at = Some(completed_at);
        record.error = message.clone();
        record.next_attempt_at = retry_after
            .and_then(|after| chrono::Duration::from_std(after).ok())
            .map(|after| completed_at + after);
        if let Err(err) = self.ledger.record_settlement_attempt(record).await {
            warn!(transaction_id = %tx_id, error = %err, "record settlement attempt failed");
        }

        if !status.is_final() {
            if attempts >= self.max_attempts {
                let reason = if status == AttemptStatus::Error {
                    "resolver error"
                } else {
                    "max attempts exceeded"
                };
                match self
                    .ledger
                    .mark_dead_letter(tx_id, reason, message.as_deref().unwrap_or_default())
                    .await
                {
                    Ok(_) => report.dead_lettered += 1,
                    Err(err) => warn!(transaction_id = %tx_id, error = %err, "failed to mark dead letter"),
                }
                self.clear_schedule(tx_id);
            } else {
                report.retried += 1;
                self.schedule_next(tx_id, retry_after);
            }
            return;
        }

        let success = status == AttemptStatus::Succeeded;
        match self
            .ledger
            .complete_withdrawal(tx_id, success, message.as_deref().unwrap_or_default())
            .await
        {
            Ok(_) => {
                info!(
                    transaction_id = %tx_id,
                    account_id = %tx.user_account_id,
                    success,
                    "settlement poller completed withdrawal"
                );
                if success {
                    report.settled += 1;
                } else {
                    report.failed += 1;
                }
                self.clear_schedule(tx_id);
            }
            Err(err) => {
                warn!(transaction_id = %tx_id, error = %err, "complete withdrawal failed");
                self.schedule_next(tx_id, retry_after);
            }
        }
    }

    /// Withdrawals with a retry time held in memory.
    pub fn tracked(&self) -> usize {
        self.next_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drops retry state for withdrawals that are no longer pending.
    fn prune(&self, active: &HashSet<Uuid>) {
        let stale: Vec<Uuid> = {
            let mut next = self.next_attempt.lock().unwrap_or_else(PoisonError::into_inner);
            let stale = next.keys().filter(|id| !active.contains(*id)).copied().collect();
            next.retain(|id, _| active.contains(id));
            stale
        };
        for id in stale {
            self.resolver.forget(id);
        }
    }

    fn should_attempt(&self, id: Uuid, now: DateTime<Utc>) -> bool {
        let next = self.next_attempt.lock().unwrap_or_else(PoisonError::into_inner);
        next.get(&id).map_or(true, |at| now > *at)
    }

    fn seed_next_attempt(&self, id: Uuid, at: DateTime<Utc>) {
        let mut next = self.next_attempt.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = next.entry(id).or_insert(at);
        if at < *slot {
            *slot = at;
        }
    }

    fn schedule_next(&self, id: Uuid, after: Option<Duration>) {
        let after = after.filter(|d| !d.is_zero()).unwrap_or(self.interval);
        let at = Utc::now() + chrono::Duration::from_std(after).unwrap_or_else(|_| chrono::Duration::seconds(15));
        let mut next = self.next_attempt.lock().unwrap_or_else(PoisonError::into_inner);
        next.insert(id, at);
    }

    fn clear_schedule(&self, id: Uuid) {
        self.next_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.resolver.forget(id);
    }
}
