//! API error types and HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use gazette_ledger::LedgerError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(_) | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal details stay in the logs, not the response body
        let message = match &self {
            ApiError::Database(detail) => {
                tracing::error!(error = %detail, "Database error serving request");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Database(e.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::TenantNotFound(_) => ApiError::NotFound,
            LedgerError::InvalidPlan(_)
            | LedgerError::InvalidPool(_)
            | LedgerError::InvalidFeature(_)
            | LedgerError::WebhookPayload(_) => ApiError::Validation(e.to_string()),
            LedgerError::WebhookSignatureInvalid => {
                ApiError::Validation("invalid webhook signature".to_string())
            }
            LedgerError::Database(inner) => ApiError::Database(inner.to_string()),
        }
    }
}
