use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use gasbank::{EnsureAccountOptions, GasAccount, Summary};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::{owned_account, owner_id};
use crate::errors::AppResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub gas_account_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EnsureAccountRequest {
    #[serde(default)]
    pub wallet_address: String,
    pub min_balance: Option<Decimal>,
    pub daily_limit: Option<Decimal>,
    pub notification_threshold: Option<Decimal>,
    pub required_approvals: Option<u32>,
}

/// Every gas account of the owner, or just one with `?gas_account_id=`.
pub async fn list(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<AccountQuery>,
) -> AppResult<Response> {
    let owner = owner_id(&owner)?;
    if let Some(gas_account_id) = query.gas_account_id {
        let account = owned_account(&state, &owner, gas_account_id).await?;
        return Ok(Json(account).into_response());
    }
    let accounts = state.ledger.list_accounts(&owner).await?;
    Ok(Json(accounts).into_response())
}

pub async fn ensure(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(request): Json<EnsureAccountRequest>,
) -> AppResult<Json<GasAccount>> {
    let owner = owner_id(&owner)?;
    let options = EnsureAccountOptions {
        wallet_address: request.wallet_address,
        min_balance: request.min_balance,
        daily_limit: request.daily_limit,
        notification_threshold: request.notification_threshold,
        required_approvals: request.required_approvals,
    };
    let account = state
        .ledger
        .ensure_account_with_options(&owner, options)
        .await?;
    Ok(Json(account))
}

pub async fn summary(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> AppResult<Json<Summary>> {
    let owner = owner_id(&owner)?;
    Ok(Json(state.ledger.summary(&owner).await?))
}
