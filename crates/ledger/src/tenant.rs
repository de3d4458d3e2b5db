//! Tenant ledger store
//!
//! One row per provisioned newspaper site, holding the two credit pools
//! (subscription and top-off), the plan, and the cumulative usage counter.
//! All balance mutations go through the operation services (adjustment,
//! usage, grants); this module owns the row model and the non-mutating
//! queries plus tenant creation.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::transactions::{append_record, CreditPool, NewTransaction};

/// Subscription plan for a tenant. Informational to the ledger: it does not
/// gate the adjustment operation, but the renewal path reads the monthly
/// allowance from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Starter,
    Growth,
    Professional,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Starter => "starter",
            Plan::Growth => "growth",
            Plan::Professional => "professional",
        }
    }

    /// Subscription credits granted each billing cycle.
    pub fn monthly_allowance(&self) -> i64 {
        match self {
            Plan::Starter => 100,
            Plan::Growth => 300,
            Plan::Professional => 1_000,
        }
    }
}

impl std::str::FromStr for Plan {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starter" => Ok(Plan::Starter),
            "growth" => Ok(Plan::Growth),
            "professional" => Ok(Plan::Professional),
            other => Err(LedgerError::InvalidPlan(other.to_string())),
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant lifecycle state. Informational to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Provisioning,
    Active,
    Suspended,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Provisioning => "provisioning",
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
        }
    }
}

/// The two credit pools of a tenant, as a value type.
///
/// This is the single place where raw balance numbers become ledger
/// balances: the constructor floors both pools at zero, so downstream
/// arithmetic never sees a negative balance regardless of source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditBalances {
    pub subscription: i64,
    pub top_off: i64,
}

impl CreditBalances {
    pub fn new(subscription: i64, top_off: i64) -> Self {
        Self {
            subscription: subscription.max(0),
            top_off: top_off.max(0),
        }
    }

    /// Derived total; never stored.
    pub fn total(&self) -> i64 {
        self.subscription + self.top_off
    }

    pub fn get(&self, pool: CreditPool) -> i64 {
        match pool {
            CreditPool::Subscription => self.subscription,
            CreditPool::TopOff => self.top_off,
        }
    }

    pub fn with_pool(&self, pool: CreditPool, value: i64) -> Self {
        match pool {
            CreditPool::Subscription => Self::new(value, self.top_off),
            CreditPool::TopOff => Self::new(self.subscription, value),
        }
    }

    pub fn is_low(&self, threshold: i64) -> bool {
        self.total() < threshold
    }
}

/// A tenant ledger row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub business_name: String,
    pub plan: String,
    pub status: String,
    pub subscription_credits: i64,
    pub top_off_credits: i64,
    pub credits_used: i64,
    pub stripe_customer_id: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Tenant {
    pub fn balances(&self) -> CreditBalances {
        CreditBalances::new(self.subscription_credits, self.top_off_credits)
    }

    pub fn total_credits(&self) -> i64 {
        self.balances().total()
    }
}

/// Parameters for creating a tenant ledger row.
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub business_name: String,
    pub plan: Plan,
    pub stripe_customer_id: Option<String>,
}

/// Read/create access to the tenant collection.
#[derive(Clone)]
pub struct TenantStore {
    pool: PgPool,
}

impl TenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a tenant with its initial plan allowance already granted.
    ///
    /// The row insert and the opening `subscription` transaction record
    /// commit together, so a tenant never exists without its grant being
    /// auditable.
    pub async fn create(&self, new: NewTenant) -> LedgerResult<Tenant> {
        let allowance = new.plan.monthly_allowance();

        let mut tx = self.pool.begin().await?;

        let tenant: Tenant = sqlx::query_as(
            r#"
            INSERT INTO tenants (
                business_name, plan, status,
                subscription_credits, stripe_customer_id, current_period_end
            )
            VALUES ($1, $2, $3, $4, $5, NOW() + INTERVAL '1 month')
            RETURNING *
            "#,
        )
        .bind(&new.business_name)
        .bind(new.plan.as_str())
        .bind(TenantStatus::Provisioning.as_str())
        .bind(allowance)
        .bind(&new.stripe_customer_id)
        .fetch_one(&mut *tx)
        .await?;

        append_record(
            &mut tx,
            NewTransaction::subscription(
                tenant.id,
                allowance,
                tenant.balances(),
                format!("Initial {} plan allowance", new.plan),
            ),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            tenant_id = %tenant.id,
            plan = %new.plan,
            allowance = allowance,
            "Tenant ledger created"
        );

        Ok(tenant)
    }

    pub async fn get(&self, tenant_id: Uuid) -> LedgerResult<Option<Tenant>> {
        let tenant = sqlx::query_as("SELECT * FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    /// Get a tenant or fail with not-found.
    pub async fn require(&self, tenant_id: Uuid) -> LedgerResult<Tenant> {
        self.get(tenant_id)
            .await?
            .ok_or(LedgerError::TenantNotFound(tenant_id))
    }

    /// Paginated roster with optional name search and plan filter.
    pub async fn list(
        &self,
        page: i64,
        limit: i64,
        search: Option<&str>,
        plan: Option<&str>,
    ) -> LedgerResult<(Vec<Tenant>, i64)> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);
        let offset = (page - 1) * limit;

        let tenants: Vec<Tenant> = sqlx::query_as(
            r#"
            SELECT * FROM tenants
            WHERE ($3::TEXT IS NULL OR business_name ILIKE '%' || $3 || '%')
              AND ($4::TEXT IS NULL OR plan = $4)
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .bind(search)
        .bind(plan)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM tenants
            WHERE ($1::TEXT IS NULL OR business_name ILIKE '%' || $1 || '%')
              AND ($2::TEXT IS NULL OR plan = $2)
            "#,
        )
        .bind(search)
        .bind(plan)
        .fetch_one(&self.pool)
        .await?;

        Ok((tenants, total.0))
    }

    /// Tenants whose combined balance is below the threshold.
    pub async fn low_credit(&self, threshold: i64) -> LedgerResult<Vec<Tenant>> {
        let tenants = sqlx::query_as(
            r#"
            SELECT * FROM tenants
            WHERE subscription_credits + top_off_credits < $1
            ORDER BY subscription_credits + top_off_credits ASC
            "#,
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(tenants)
    }

    /// Tenants whose billing period has elapsed, due for a renewal.
    pub async fn due_for_renewal(&self) -> LedgerResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM tenants
            WHERE current_period_end IS NOT NULL
              AND current_period_end < NOW()
              AND status = 'active'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn find_by_stripe_customer(
        &self,
        customer_id: &str,
    ) -> LedgerResult<Option<Tenant>> {
        let tenant = sqlx::query_as("SELECT * FROM tenants WHERE stripe_customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    pub async fn set_status(&self, tenant_id: Uuid, status: TenantStatus) -> LedgerResult<()> {
        let result =
            sqlx::query("UPDATE tenants SET status = $1, updated_at = NOW() WHERE id = $2")
                .bind(status.as_str())
                .bind(tenant_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::TenantNotFound(tenant_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parse_round_trip() {
        for plan in [Plan::Starter, Plan::Growth, Plan::Professional] {
            assert_eq!(plan.as_str().parse::<Plan>().unwrap(), plan);
        }
    }

    #[test]
    fn plan_parse_rejects_unknown() {
        assert!(matches!(
            "enterprise".parse::<Plan>(),
            Err(LedgerError::InvalidPlan(_))
        ));
    }

    #[test]
    fn allowances_increase_with_tier() {
        assert!(Plan::Starter.monthly_allowance() < Plan::Growth.monthly_allowance());
        assert!(Plan::Growth.monthly_allowance() < Plan::Professional.monthly_allowance());
    }

    #[test]
    fn balances_floor_negative_inputs() {
        let balances = CreditBalances::new(-5, 20);
        assert_eq!(balances.subscription, 0);
        assert_eq!(balances.top_off, 20);
        assert_eq!(balances.total(), 20);
    }

    #[test]
    fn low_balance_threshold_is_exclusive() {
        let balances = CreditBalances::new(30, 20);
        assert!(!balances.is_low(50));
        assert!(balances.is_low(51));
    }
}
