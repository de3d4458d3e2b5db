//! Ledger error types

use uuid::Uuid;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Target tenant row missing at mutation time; nothing was written
    #[error("tenant {0} not found")]
    TenantNotFound(Uuid),

    #[error("invalid plan '{0}' (expected starter, growth, or professional)")]
    InvalidPlan(String),

    #[error("invalid credit pool '{0}' (expected subscription or topoff)")]
    InvalidPool(String),

    #[error("invalid usage feature '{0}'")]
    InvalidFeature(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("webhook payload invalid: {0}")]
    WebhookPayload(String),
}
