//! Billing-driven credit grants
//!
//! The credit-positive mutation paths behind the `subscription`, `topoff`,
//! and `bonus` transaction kinds. Renewal is driven by the worker sweep and
//! the Stripe invoice webhook; top-offs by the checkout webhook; bonuses by
//! support tooling. All three share the adjustment operation's transactional
//! shape: lock the tenant row, mutate, append the record, commit.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::tenant::{CreditBalances, Plan};
use crate::transactions::{append_record, CreditPool, NewTransaction};

/// Result of a billing-cycle renewal.
#[derive(Debug, Clone, Serialize)]
pub struct RenewalOutcome {
    pub tenant_id: Uuid,
    pub plan: Plan,
    pub allowance: i64,
    /// Subscription balance before the reset.
    pub previous: i64,
    /// Delta applied (allowance - previous; negative when the pool held
    /// more than the new allowance).
    pub delta: i64,
    pub balances: CreditBalances,
}

/// Service for billing-driven credit grants.
#[derive(Clone)]
pub struct GrantService {
    pool: PgPool,
}

impl GrantService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reset the subscription pool to the plan allowance and advance the
    /// billing period.
    ///
    /// This is a reset, not an add: leftover subscription credits do not
    /// roll over. The top-off pool is untouched.
    pub async fn renew_subscription_credits(
        &self,
        tenant_id: Uuid,
    ) -> LedgerResult<RenewalOutcome> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT plan, subscription_credits, top_off_credits FROM tenants WHERE id = $1 FOR UPDATE",
        )
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (plan_name, previous, top_off) =
            current.ok_or(LedgerError::TenantNotFound(tenant_id))?;
        let plan: Plan = plan_name.parse()?;
        let allowance = plan.monthly_allowance();

        sqlx::query(
            r#"
            UPDATE tenants SET
                subscription_credits = $1,
                current_period_end = NOW() + INTERVAL '1 month',
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(allowance)
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

        let balances = CreditBalances::new(allowance, top_off);
        let delta = allowance - previous;

        append_record(
            &mut tx,
            NewTransaction::subscription(
                tenant_id,
                delta,
                balances,
                format!("Monthly {} plan renewal", plan),
            ),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            tenant_id = %tenant_id,
            plan = %plan,
            allowance = allowance,
            previous = previous,
            "Subscription credits renewed"
        );

        Ok(RenewalOutcome {
            tenant_id,
            plan,
            allowance,
            previous,
            delta,
            balances,
        })
    }

    /// Credit a purchased top-off. Top-off credits never expire.
    pub async fn grant_top_off(
        &self,
        tenant_id: Uuid,
        credits: i64,
        description: &str,
    ) -> LedgerResult<CreditBalances> {
        let credits = credits.max(0);
        self.grant(
            tenant_id,
            CreditPool::TopOff,
            credits,
            |tenant_id, balances| {
                NewTransaction::top_off(tenant_id, credits, balances, description.to_string())
            },
        )
        .await
    }

    /// Promotional grant to either pool.
    pub async fn grant_bonus(
        &self,
        tenant_id: Uuid,
        pool: CreditPool,
        credits: i64,
        description: &str,
    ) -> LedgerResult<CreditBalances> {
        let credits = credits.max(0);
        self.grant(tenant_id, pool, credits, |tenant_id, balances| {
            NewTransaction::bonus(tenant_id, pool, credits, balances, description.to_string())
        })
        .await
    }

    async fn grant(
        &self,
        tenant_id: Uuid,
        target: CreditPool,
        credits: i64,
        make_record: impl FnOnce(Uuid, CreditBalances) -> NewTransaction,
    ) -> LedgerResult<CreditBalances> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(i64, i64)> = sqlx::query_as(
            "SELECT subscription_credits, top_off_credits FROM tenants WHERE id = $1 FOR UPDATE",
        )
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (subscription, top_off) =
            current.ok_or(LedgerError::TenantNotFound(tenant_id))?;

        let balances = CreditBalances::new(subscription, top_off);
        let balances = balances.with_pool(target, balances.get(target) + credits);

        let update_sql = match target {
            CreditPool::Subscription => {
                "UPDATE tenants SET subscription_credits = $1, updated_at = NOW() WHERE id = $2"
            }
            CreditPool::TopOff => {
                "UPDATE tenants SET top_off_credits = $1, updated_at = NOW() WHERE id = $2"
            }
        };

        sqlx::query(update_sql)
            .bind(balances.get(target))
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        append_record(&mut tx, make_record(tenant_id, balances)).await?;

        tx.commit().await?;

        tracing::info!(
            tenant_id = %tenant_id,
            pool = %target,
            credits = credits,
            subscription_balance = balances.subscription,
            top_off_balance = balances.top_off,
            "Credits granted"
        );

        Ok(balances)
    }
}
