//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use gazette_ledger::LedgerService;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub ledger: Arc<LedgerService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let ledger = LedgerService::new(pool, config.stripe_webhook_secret.clone());

        if ledger.webhooks.is_configured() {
            tracing::info!("Stripe webhook verification enabled");
        } else {
            tracing::warn!(
                "Stripe webhook verification not configured (missing STRIPE_WEBHOOK_SECRET)"
            );
        }

        Self {
            config,
            ledger: Arc::new(ledger),
        }
    }
}
