use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use gasbank::{DeadLetter, Transaction};
use serde::Deserialize;
use uuid::Uuid;

use super::owner_id;
use crate::errors::AppResult;
use crate::v1::parse_limit;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    pub limit: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<DeadLetterQuery>,
) -> AppResult<Json<Vec<DeadLetter>>> {
    let owner = owner_id(&owner)?;
    let limit = parse_limit(query.limit.as_deref())?;
    Ok(Json(state.ledger.list_dead_letters(&owner, limit).await?))
}

pub async fn retry(
    State(state): State<AppState>,
    Path((owner, tx_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Transaction>> {
    let owner = owner_id(&owner)?;
    Ok(Json(state.ledger.retry_dead_letter(&owner, tx_id).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((owner, tx_id)): Path<(String, Uuid)>,
) -> AppResult<StatusCode> {
    let owner = owner_id(&owner)?;
    state.ledger.delete_dead_letter(&owner, tx_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
