use axum::{
    extract::{Path, Query, State},
    Json,
};
use gasbank::{SettlementAttempt, Transaction};
use serde::Deserialize;
use uuid::Uuid;

use super::owner_id;
use crate::errors::{AppError, AppResult};
use crate::v1::parse_limit;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateWithdrawalRequest {
    pub action: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<String>,
}

pub async fn get(
    State(state): State<AppState>,
    Path((owner, tx_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Transaction>> {
    let owner = owner_id(&owner)?;
    Ok(Json(state.ledger.get_withdrawal(&owner, tx_id).await?))
}

/// Only `{"action":"cancel"}` is understood.
pub async fn update(
    State(state): State<AppState>,
    Path((owner, tx_id)): Path<(String, Uuid)>,
    Json(request): Json<UpdateWithdrawalRequest>,
) -> AppResult<Json<Transaction>> {
    let owner = owner_id(&owner)?;
    match request.action.trim().to_ascii_lowercase().as_str() {
        "cancel" => {
            let applied = state
                .ledger
                .cancel_withdrawal(&owner, tx_id, &request.reason)
                .await?;
            Ok(Json(applied.transaction))
        }
        other => Err(AppError::bad_request(format!(
            "unsupported action: {other}"
        ))),
    }
}

pub async fn attempts(
    State(state): State<AppState>,
    Path((owner, tx_id)): Path<(String, Uuid)>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<SettlementAttempt>>> {
    let owner = owner_id(&owner)?;
    let limit = parse_limit(query.limit.as_deref())?;
    let attempts = state
        .ledger
        .list_settlement_attempts(&owner, tx_id, limit)
        .await?;
    Ok(Json(attempts))
}
