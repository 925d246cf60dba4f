use axum::{
    routing::{get, post},
    Router,
};
use gasbank::{GasAccount, LedgerError};
use tracing::warn;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::AppState;

mod approvals;
mod dead_letters;
mod profile;
mod transactions;
mod withdrawals;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(profile::list).post(profile::ensure))
        .route("/summary", get(profile::summary))
        .route("/deposit", post(transactions::deposit))
        .route("/withdraw", post(transactions::withdraw))
        .route("/transactions", get(transactions::list))
        .route(
            "/withdrawals/:tx_id",
            get(withdrawals::get).patch(withdrawals::update),
        )
        .route("/withdrawals/:tx_id/attempts", get(withdrawals::attempts))
        .route(
            "/approvals/:tx_id",
            get(approvals::list).post(approvals::submit),
        )
        .route("/deadletters", get(dead_letters::list))
        .route("/deadletters/:tx_id/retry", post(dead_letters::retry))
        .route("/deadletters/:tx_id", axum::routing::delete(dead_letters::delete))
}

fn owner_id(raw: &str) -> AppResult<String> {
    let owner = raw.trim();
    if owner.is_empty() {
        return Err(AppError::bad_request("account id required"));
    }
    Ok(owner.to_string())
}

/// Loads a gas account and hides it from anyone but its owner.
async fn owned_account(state: &AppState, owner: &str, gas_account_id: Uuid) -> AppResult<GasAccount> {
    let account = state.ledger.get_account(gas_account_id).await?;
    if account.account_id != owner {
        warn!(
            gas_account_id = %gas_account_id,
            account_id = %owner,
            "gas account requested by non-owner"
        );
        return Err(LedgerError::not_found(format!("gas account {gas_account_id}")).into());
    }
    Ok(account)
}
