//! Admin authentication middleware
//!
//! Every admin route is gated by a shared-secret `x-admin-key` header.
//! The ledger itself performs no authorization; this middleware is the
//! single gate in front of it.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::state::AppState;

const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Compare the presented key against the configured secret in constant time.
fn key_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Reject requests without a valid admin key.
pub async fn require_admin_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    match presented {
        Some(key) if key_matches(key, &state.config.admin_api_key) => next.run(request).await,
        _ => {
            tracing::warn!(
                path = %request.uri().path(),
                "Rejected admin request with missing or invalid admin key"
            );
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn matching_keys_pass() {
        assert!(key_matches("super-secret-admin-key", "super-secret-admin-key"));
    }

    #[test]
    fn wrong_or_truncated_keys_fail() {
        assert!(!key_matches("super-secret-admin-kez", "super-secret-admin-key"));
        assert!(!key_matches("super-secret", "super-secret-admin-key"));
        assert!(!key_matches("", "super-secret-admin-key"));
    }
}
