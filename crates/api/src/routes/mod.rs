//! HTTP routes

pub mod admin;
pub mod webhooks;

use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::auth::require_admin_key;
use crate::state::AppState;

/// Build the full application router.
///
/// Admin routes sit behind the shared-secret middleware; the webhook
/// ingress is gated by Stripe signature verification instead.
pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/tenants",
            get(admin::list_tenants).post(admin::create_tenant),
        )
        .route("/tenants/{id}", get(admin::get_tenant))
        .route("/tenants/{id}/credits/adjust", post(admin::adjust_credits))
        .route(
            "/tenants/{id}/transactions",
            get(admin::list_tenant_transactions),
        )
        .route("/transactions", get(admin::recent_transactions))
        .route("/credits/overview", get(admin::credit_overview))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_key,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/webhooks/stripe", post(webhooks::stripe_webhook))
        .nest("/api/admin", admin_routes)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
