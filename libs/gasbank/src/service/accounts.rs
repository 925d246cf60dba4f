use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{required, LedgerService};
use crate::error::{LedgerError, LedgerResult, StoreError};
use crate::types::{normalize_wallet_address, GasAccount, Transaction, TransactionType};

/// Settings applied when an account is created or refreshed. `None` leaves
/// the current value alone; negative amounts are stored as zero.
#[derive(Debug, Clone, Default)]
pub struct EnsureAccountOptions {
    pub wallet_address: String,
    pub min_balance: Option<Decimal>,
    pub daily_limit: Option<Decimal>,
    pub notification_threshold: Option<Decimal>,
    pub required_approvals: Option<u32>,
}

impl EnsureAccountOptions {
    pub fn wallet(wallet_address: impl Into<String>) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            ..Self::default()
        }
    }

    /// Returns true when something on `account` changed.
    fn apply_to(&self, account: &mut GasAccount) -> bool {
        let mut changed = false;
        let mut set = |field: &mut Decimal, value: Option<Decimal>| {
            if let Some(value) = value {
                let value = value.max(Decimal::ZERO);
                if *field != value {
                    *field = value;
                    changed = true;
                }
            }
        };
        set(&mut account.min_balance, self.min_balance);
        set(&mut account.daily_limit, self.daily_limit);
        set(&mut account.notification_threshold, self.notification_threshold);

        if let Some(required) = self.required_approvals {
            if account.required_approvals != required {
                account.required_approvals = required;
                changed = true;
            }
        }
        changed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionBrief {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Transaction> for TransactionBrief {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            tx_type: tx.tx_type,
            amount: tx.amount,
            status: tx.status.to_string(),
            created_at: tx.created_at,
            completed_at: tx.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub gas_account_id: Uuid,
    pub wallet_address: String,
    pub balance: Decimal,
    pub available: Decimal,
    pub pending: Decimal,
    pub locked: Decimal,
    pub pending_withdrawals: usize,
    pub pending_amount: Decimal,
}

/// Per-owner aggregate over every account and its recent transactions.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub account_id: String,
    pub accounts: Vec<AccountSummary>,
    pub total_balance: Decimal,
    pub total_available: Decimal,
    pub total_locked: Decimal,
    pub pending_withdrawals: usize,
    pub pending_amount: Decimal,
    pub last_deposit: Option<TransactionBrief>,
    pub last_withdrawal: Option<TransactionBrief>,
    pub generated_at: DateTime<Utc>,
}

impl LedgerService {
    pub async fn ensure_account(&self, owner: &str, wallet: &str) -> LedgerResult<GasAccount> {
        self.ensure_account_with_options(owner, EnsureAccountOptions::wallet(wallet))
            .await
    }

    /// Returns the owner's account, creating it on first use. A wallet that
    /// already belongs to a different owner is refused.
    pub async fn ensure_account_with_options(
        &self,
        owner: &str,
        options: EnsureAccountOptions,
    ) -> LedgerResult<GasAccount> {
        let owner = required(owner, "account_id")?;
        let wallet = normalize_wallet_address(&options.wallet_address);
        let _owner_guard = self.inner.owner_locks.lock(&owner).await;
        let store = &self.inner.store;

        if !wallet.is_empty() {
            match store.get_gas_account_by_wallet(&wallet).await {
                Ok(holder) if holder.account_id != owner => {
                    warn!(account_id = %owner, wallet = %wallet, "wallet already assigned to another account");
                    return Err(LedgerError::WalletInUse);
                }
                Ok(_) | Err(StoreError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let existing = store.list_gas_accounts(Some(&owner)).await?;
        if let Some(first) = existing.into_iter().next() {
            let _account_guard = self.inner.account_locks.lock(&first.id).await;
            let mut account = store.get_gas_account(first.id).await?;
            let mut changed = options.apply_to(&mut account);
            if !wallet.is_empty() && account.wallet_address != wallet {
                account.wallet_address = wallet;
                changed = true;
            }
            if !changed {
                return Ok(account);
            }
            let account = store
                .update_gas_account(account)
                .await
                .map_err(wallet_conflict)?;
            debug!(gas_account_id = %account.id, account_id = %owner, "gas account updated");
            return Ok(account);
        }

        let mut account = GasAccount::new(owner.clone(), &wallet);
        options.apply_to(&mut account);
        let account = store
            .create_gas_account(account)
            .await
            .map_err(wallet_conflict)?;
        info!(gas_account_id = %account.id, account_id = %owner, "gas account created");
        Ok(account)
    }

    pub async fn get_account(&self, gas_account_id: Uuid) -> LedgerResult<GasAccount> {
        Ok(self.inner.store.get_gas_account(gas_account_id).await?)
    }

    /// Accounts of `owner`, or of every owner when `owner` is blank.
    pub async fn list_accounts(&self, owner: &str) -> LedgerResult<Vec<GasAccount>> {
        let owner = owner.trim();
        let filter = (!owner.is_empty()).then_some(owner);
        Ok(self.inner.store.list_gas_accounts(filter).await?)
    }

    pub async fn summary(&self, owner: &str) -> LedgerResult<Summary> {
        let owner = required(owner, "account_id")?;
        let store = &self.inner.store;
        let accounts = store.list_gas_accounts(Some(&owner)).await?;
        let scan = self.inner.config.max_list_limit;

        let mut summary = Summary {
            account_id: owner,
            accounts: Vec::with_capacity(accounts.len()),
            total_balance: Decimal::ZERO,
            total_available: Decimal::ZERO,
            total_locked: Decimal::ZERO,
            pending_withdrawals: 0,
            pending_amount: Decimal::ZERO,
            last_deposit: None,
            last_withdrawal: None,
            generated_at: Utc::now(),
        };
        let mut last_deposit: Option<&Transaction> = None;
        let mut last_withdrawal: Option<&Transaction> = None;
        let mut history = Vec::with_capacity(accounts.len());

        for account in &accounts {
            history.push(store.list_gas_transactions(account.id, scan).await?);
        }

        for (account, txs) in accounts.iter().zip(&history) {
            let mut entry = AccountSummary {
                gas_account_id: account.id,
                wallet_address: account.wallet_address.clone(),
                balance: account.balance,
                available: account.available,
                pending: account.pending,
                locked: account.locked,
                pending_withdrawals: 0,
                pending_amount: Decimal::ZERO,
            };
            for tx in txs {
                match tx.tx_type {
                    TransactionType::Withdrawal => {
                        if tx.status.is_active_withdrawal() {
                            entry.pending_withdrawals += 1;
                            entry.pending_amount += tx.amount;
                        }
                        if last_withdrawal.map_or(true, |last| tx.created_at > last.created_at) {
                            last_withdrawal = Some(tx);
                        }
                    }
                    TransactionType::Deposit => {
                        if last_deposit.map_or(true, |last| tx.created_at > last.created_at) {
                            last_deposit = Some(tx);
                        }
                    }
                }
            }
            summary.total_balance += account.balance;
            summary.total_available += account.available;
            summary.total_locked += account.locked;
            summary.pending_withdrawals += entry.pending_withdrawals;
            summary.pending_amount += entry.pending_amount;
            summary.accounts.push(entry);
        }

        summary.last_deposit = last_deposit.map(TransactionBrief::from);
        summary.last_withdrawal = last_withdrawal.map(TransactionBrief::from);
        Ok(summary)
    }
}

fn wallet_conflict(err: StoreError) -> LedgerError {
    match err {
        StoreError::Conflict(_) => LedgerError::WalletInUse,
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn options_clamp_negative_amounts() {
        let mut account = GasAccount::new("owner", "");
        let options = EnsureAccountOptions {
            min_balance: Some(dec!(-5)),
            daily_limit: Some(dec!(20)),
            required_approvals: Some(2),
            ..EnsureAccountOptions::default()
        };
        assert!(options.apply_to(&mut account));
        assert_eq!(account.min_balance, Decimal::ZERO);
        assert_eq!(account.daily_limit, dec!(20));
        assert_eq!(account.required_approvals, 2);
        assert!(!options.apply_to(&mut account));
    }

    #[test]
    fn explicit_zero_overwrites_and_none_keeps() {
        let mut account = GasAccount::new("owner", "");
        account.min_balance = dec!(3);
        account.daily_limit = dec!(5);
        account.required_approvals = 2;

        let options = EnsureAccountOptions {
            daily_limit: Some(Decimal::ZERO),
            required_approvals: Some(0),
            ..EnsureAccountOptions::default()
        };
        assert!(options.apply_to(&mut account));
        assert_eq!(account.daily_limit, Decimal::ZERO);
        assert_eq!(account.required_approvals, 0);
        assert_eq!(account.min_balance, dec!(3));

        assert!(!EnsureAccountOptions::default().apply_to(&mut account));
    }
}
