//! Stripe webhook ingress

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Receive a Stripe event: verify the signature, then hand off to the
/// ledger's webhook handler. Returns 200 on success so Stripe stops
/// retrying; signature and payload problems return 400.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<StatusCode> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Validation("missing stripe-signature header".to_string()))?;

    let event = state.ledger.webhooks.verify_event(&body, signature)?;
    state.ledger.webhooks.handle_event(event).await?;

    Ok(StatusCode::OK)
}
