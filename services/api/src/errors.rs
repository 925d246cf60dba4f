use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gasbank::LedgerError;
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
#[error("{status}: {message}")]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::WalletInUse => AppError::conflict(err.to_string()),
            LedgerError::NotFound(_) => AppError::not_found(err.to_string()),
            LedgerError::InvalidAmount
            | LedgerError::Validation(_)
            | LedgerError::InvalidTransition { .. }
            | LedgerError::InsufficientFunds
            | LedgerError::MinBalance
            | LedgerError::DailyLimit
            | LedgerError::CronUnsupported => AppError::bad_request(err.to_string()),
            LedgerError::Store(_) | LedgerError::Invariant(_) | LedgerError::Internal(_) => {
                error!(error = %err, "ledger operation failed");
                AppError::internal_server_error("internal server error")
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
