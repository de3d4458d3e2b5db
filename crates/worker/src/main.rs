//! Gazette Background Worker
//!
//! Handles scheduled jobs including:
//! - Subscription credit renewal for elapsed billing periods (hourly)
//! - Low-balance tenant scan for the alerting pipeline (every 6 hours)

use std::sync::Arc;
use std::time::Duration;

use gazette_ledger::{GrantService, TenantStore, LOW_CREDIT_THRESHOLD};
use sqlx::postgres::PgPoolOptions;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

/// Create a database connection pool
async fn create_db_pool() -> anyhow::Result<sqlx::PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

/// Renew subscription credits for every tenant whose billing period has
/// elapsed. Each tenant renews independently; one failure does not stop
/// the sweep.
async fn run_renewal_sweep(tenants: &TenantStore, grants: &GrantService) {
    let due = match tenants.due_for_renewal().await {
        Ok(due) => due,
        Err(e) => {
            error!(error = %e, "Failed to query tenants due for renewal");
            return;
        }
    };

    let total = due.len();
    let mut renewed = 0;
    let mut errors = 0;

    for tenant_id in due {
        match grants.renew_subscription_credits(tenant_id).await {
            Ok(outcome) => {
                renewed += 1;
                info!(
                    tenant_id = %tenant_id,
                    plan = %outcome.plan,
                    allowance = outcome.allowance,
                    "Renewed subscription credits"
                );
            }
            Err(e) => {
                errors += 1;
                error!(tenant_id = %tenant_id, error = %e, "Failed to renew tenant");
            }
        }
    }

    info!(
        total = total,
        renewed = renewed,
        errors = errors,
        "Renewal sweep complete"
    );
}

/// Log tenants running low on credits so the alerting pipeline can pick
/// them up. Read-only.
async fn run_low_balance_scan(tenants: &TenantStore) {
    let low = match tenants.low_credit(LOW_CREDIT_THRESHOLD).await {
        Ok(low) => low,
        Err(e) => {
            error!(error = %e, "Failed to query low-balance tenants");
            return;
        }
    };

    for tenant in &low {
        warn!(
            tenant_id = %tenant.id,
            business_name = %tenant.business_name,
            total_credits = tenant.total_credits(),
            "Tenant running low on credits"
        );
    }

    info!(
        low_balance_tenants = low.len(),
        threshold = LOW_CREDIT_THRESHOLD,
        "Low-balance scan complete"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Gazette Worker");

    // Create database pool
    let pool = create_db_pool().await?;

    let tenants = Arc::new(TenantStore::new(pool.clone()));
    let grants = Arc::new(GrantService::new(pool.clone()));

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Subscription credit renewal (hourly at :10)
    // Stripe invoice webhooks usually renew tenants first; the sweep picks
    // up anything the webhook path missed.
    let renewal_tenants = tenants.clone();
    let renewal_grants = grants.clone();
    scheduler
        .add(Job::new_async("0 10 * * * *", move |_uuid, _l| {
            let tenants = renewal_tenants.clone();
            let grants = renewal_grants.clone();
            Box::pin(async move {
                info!("Running subscription renewal sweep");
                run_renewal_sweep(&tenants, &grants).await;
            })
        })?)
        .await?;
    info!("Scheduled: Subscription renewal sweep (hourly)");

    // Job 2: Low-balance scan (every 6 hours at :30)
    let scan_tenants = tenants.clone();
    scheduler
        .add(Job::new_async("0 30 */6 * * *", move |_uuid, _l| {
            let tenants = scan_tenants.clone();
            Box::pin(async move {
                info!("Running low-balance scan");
                run_low_balance_scan(&tenants).await;
            })
        })?)
        .await?;
    info!("Scheduled: Low-balance scan (every 6 hours)");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Start the scheduler
    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("Gazette Worker started successfully with {} scheduled jobs", 3);

    // Keep the main task running
    // The scheduler runs jobs in background tasks
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
