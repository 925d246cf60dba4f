//! Protocol fee escrow on top of the ledger.
//!
//! Fees move between `available` and `locked` and never create transaction
//! records. Callers pass amounts in the chain's smallest unit.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::{LedgerError, LedgerResult};
use crate::service::{required, LedgerService};
use crate::types::GasAccount;

/// Decimal places between the smallest chain unit and one whole token.
pub const FEE_UNIT_SCALE: u32 = 8;

pub fn from_smallest_unit(amount: i64) -> Decimal {
    Decimal::new(amount, FEE_UNIT_SCALE)
}

#[derive(Clone)]
pub struct FeeCollector {
    ledger: LedgerService,
}

impl FeeCollector {
    pub fn new(ledger: LedgerService) -> Self {
        Self { ledger }
    }

    /// Moves the fee from `available` into escrow.
    pub async fn collect_fee(&self, owner: &str, amount: i64, reference: &str) -> LedgerResult<()> {
        if amount <= 0 {
            return Ok(());
        }
        let fee = from_smallest_unit(amount);
        let account = self.account_for(owner).await?;
        let account = self
            .ledger
            .update_account(account.id, move |account| {
                if account.available < fee {
                    return Err(LedgerError::InsufficientFunds);
                }
                account.available -= fee;
                account.locked += fee;
                Ok(())
            })
            .await?;
        info!(gas_account_id = %account.id, fee = %fee, reference, "fee collected");
        Ok(())
    }

    /// Hands escrowed fee back to `available`, capped at what is locked.
    pub async fn refund_fee(&self, owner: &str, amount: i64, reference: &str) -> LedgerResult<()> {
        if amount <= 0 {
            return Ok(());
        }
        let requested = from_smallest_unit(amount);
        let account = self.account_for(owner).await?;
        let account = self
            .ledger
            .update_account(account.id, move |account| {
                let refund = requested.min(account.locked);
                account.locked -= refund;
                account.available += refund;
                Ok(())
            })
            .await?;
        debug!(gas_account_id = %account.id, fee = %requested, reference, "fee refunded");
        Ok(())
    }

    /// Takes escrowed fee off the books, capped at what is locked.
    pub async fn settle_fee(&self, owner: &str, amount: i64, reference: &str) -> LedgerResult<()> {
        if amount <= 0 {
            return Ok(());
        }
        let requested = from_smallest_unit(amount);
        let account = self.account_for(owner).await?;
        let account = self
            .ledger
            .update_account(account.id, move |account| {
                let settled = requested.min(account.locked);
                account.locked -= settled;
                account.balance -= settled;
                Ok(())
            })
            .await?;
        debug!(gas_account_id = %account.id, fee = %requested, reference, "fee settled");
        Ok(())
    }

    async fn account_for(&self, owner: &str) -> LedgerResult<GasAccount> {
        let owner = required(owner, "account_id")?;
        self.ledger
            .list_accounts(&owner)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LedgerError::not_found(format!("gas account for {owner}")))
    }
}
