use axum::{
    extract::{Path, State},
    Json,
};
use gasbank::{Approval, Transaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::owner_id;
use crate::errors::AppResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub approver: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub note: String,
    #[serde(default = "default_approve")]
    pub approve: bool,
}

fn default_approve() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub approval: Approval,
    pub transaction: Transaction,
}

pub async fn list(
    State(state): State<AppState>,
    Path((owner, tx_id)): Path<(String, Uuid)>,
) -> AppResult<Json<Vec<Approval>>> {
    let owner = owner_id(&owner)?;
    let withdrawal = state.ledger.get_withdrawal(&owner, tx_id).await?;
    Ok(Json(withdrawal.approvals))
}

pub async fn submit(
    State(state): State<AppState>,
    Path((owner, tx_id)): Path<(String, Uuid)>,
    Json(request): Json<ApprovalRequest>,
) -> AppResult<Json<ApprovalResponse>> {
    let owner = owner_id(&owner)?;
    state.ledger.get_withdrawal(&owner, tx_id).await?;
    let (approval, transaction) = state
        .ledger
        .submit_approval(
            tx_id,
            &request.approver,
            &request.signature,
            &request.note,
            request.approve,
        )
        .await?;
    Ok(Json(ApprovalResponse {
        approval,
        transaction,
    }))
}
