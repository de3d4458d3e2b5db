// Ledger crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Gazette Credit Ledger
//!
//! The dual-pool credit system metering AI-feature usage per tenant.
//!
//! ## Features
//!
//! - **Tenant Store**: per-tenant ledger rows (subscription + top-off pools)
//! - **Adjustments**: admin-initiated balance mutations, atomic and clamped at zero
//! - **Usage Metering**: per-feature debits with subscription-to-top-off spillover
//! - **Grants**: billing-cycle renewals, top-off purchases, bonus credits
//! - **Transaction Log**: append-only audit trail, one record per mutation
//! - **Aggregation**: recomputed overview/breakdown views for the admin command center
//! - **Webhooks**: Stripe checkout and invoice events driving grants

pub mod adjustment;
pub mod aggregation;
pub mod error;
pub mod grants;
pub mod tenant;
pub mod transactions;
pub mod usage;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Adjustment
pub use adjustment::{apply_adjustment, AdjustmentEffect, AdjustmentOutcome, AdjustmentService};

// Aggregation
pub use aggregation::{
    AggregationService, CreditOverview, CreditReport, FeatureUsage, TopConsumer,
    DEFAULT_SCAN_LIMIT, LOW_CREDIT_THRESHOLD, TOP_CONSUMER_COUNT,
};

// Error
pub use error::{LedgerError, LedgerResult};

// Grants
pub use grants::{GrantService, RenewalOutcome};

// Tenant
pub use tenant::{CreditBalances, NewTenant, Plan, Tenant, TenantStatus, TenantStore};

// Transactions
pub use transactions::{
    CreditPool, CreditTransaction, NewTransaction, TransactionKind, TransactionLog, MAX_LOG_FETCH,
};

// Usage
pub use usage::{apply_usage, UsageEffect, UsageFeature, UsageMeter, UsageOutcome};

// Webhooks
pub use webhooks::WebhookHandler;

use sqlx::PgPool;

/// Main ledger service that combines all ledger functionality.
pub struct LedgerService {
    pub tenants: TenantStore,
    pub adjustments: AdjustmentService,
    pub usage: UsageMeter,
    pub grants: GrantService,
    pub aggregation: AggregationService,
    pub transactions: TransactionLog,
    pub webhooks: WebhookHandler,
}

impl LedgerService {
    /// Create a ledger service; `webhook_secret` may be empty, in which
    /// case webhook verification rejects all events.
    pub fn new(pool: PgPool, webhook_secret: String) -> Self {
        Self {
            tenants: TenantStore::new(pool.clone()),
            adjustments: AdjustmentService::new(pool.clone()),
            usage: UsageMeter::new(pool.clone()),
            grants: GrantService::new(pool.clone()),
            aggregation: AggregationService::new(pool.clone()),
            transactions: TransactionLog::new(pool.clone()),
            webhooks: WebhookHandler::new(pool, webhook_secret),
        }
    }

    /// Create a ledger service from environment variables.
    pub fn from_env(pool: PgPool) -> Self {
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();
        if webhook_secret.is_empty() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set - webhook ingress will reject events");
        }
        Self::new(pool, webhook_secret)
    }
}
