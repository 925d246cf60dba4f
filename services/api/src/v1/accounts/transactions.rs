use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use gasbank::{GasAccount, Transaction, TransactionStatus, TransactionType, WithdrawOptions};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{owned_account, owner_id};
use crate::errors::{AppError, AppResult};
use crate::v1::parse_limit;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub gas_account_id: Uuid,
    pub amount: Decimal,
    #[serde(default)]
    pub blockchain_tx_id: String,
    #[serde(default)]
    pub from_address: String,
    #[serde(default)]
    pub to_address: String,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub gas_account_id: Uuid,
    pub amount: Decimal,
    #[serde(default)]
    pub to_address: String,
    /// RFC 3339.
    pub schedule_at: Option<DateTime<Utc>>,
    pub cron_expression: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BalanceChange {
    pub account: GasAccount,
    pub transaction: Transaction,
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub gas_account_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    pub status: Option<String>,
    pub limit: Option<String>,
}

pub async fn deposit(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(request): Json<DepositRequest>,
) -> AppResult<(StatusCode, Json<BalanceChange>)> {
    let owner = owner_id(&owner)?;
    owned_account(&state, &owner, request.gas_account_id).await?;
    let (account, transaction) = state
        .ledger
        .deposit(
            request.gas_account_id,
            request.amount,
            &request.blockchain_tx_id,
            &request.from_address,
            &request.to_address,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(BalanceChange { account, transaction })))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(request): Json<WithdrawRequest>,
) -> AppResult<(StatusCode, Json<BalanceChange>)> {
    let owner = owner_id(&owner)?;
    let options = WithdrawOptions {
        amount: request.amount,
        to_address: request.to_address,
        schedule_at: request.schedule_at,
        cron_expression: request.cron_expression,
    };
    let (account, transaction) = state
        .ledger
        .withdraw_with_options(&owner, request.gas_account_id, options)
        .await?;
    Ok((StatusCode::CREATED, Json(BalanceChange { account, transaction })))
}

/// Newest first, optionally narrowed by `type` and `status`.
pub async fn list(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<TransactionQuery>,
) -> AppResult<Json<Vec<Transaction>>> {
    let owner = owner_id(&owner)?;
    let gas_account_id = query
        .gas_account_id
        .ok_or_else(|| AppError::bad_request("gas_account_id required"))?;
    let tx_type = match non_blank(query.tx_type.as_deref()) {
        Some(raw) => Some(
            raw.parse::<TransactionType>()
                .map_err(|e| AppError::bad_request(e.to_string()))?,
        ),
        None => None,
    };
    let status = match non_blank(query.status.as_deref()) {
        Some(raw) => Some(
            raw.parse::<TransactionStatus>()
                .map_err(|e| AppError::bad_request(e.to_string()))?,
        ),
        None => None,
    };
    let limit = parse_limit(query.limit.as_deref())?;

    owned_account(&state, &owner, gas_account_id).await?;
    let txs = state
        .ledger
        .list_transactions_filtered(gas_account_id, tx_type, status, limit)
        .await?;
    Ok(Json(txs))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
