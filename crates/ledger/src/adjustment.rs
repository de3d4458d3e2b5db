//! Admin credit adjustment
//!
//! The only out-of-band mutation path for tenant balances. The read,
//! clamp, row update, and log append all happen inside one database
//! transaction with the tenant row locked, so concurrent adjustments on the
//! same tenant serialize and the logged snapshot always reflects the true
//! post-mutation state.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::tenant::CreditBalances;
use crate::transactions::{append_record, CreditPool, NewTransaction};

/// Effect of applying a signed amount to one pool, before persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustmentEffect {
    pub balances: CreditBalances,
    /// Delta actually applied to the target pool (equals the requested
    /// amount unless the debit was floored at zero).
    pub applied: i64,
    pub clamped: bool,
}

/// Apply a signed amount to one pool, flooring at zero.
///
/// The untargeted pool is never touched. Over-debits do not error: the
/// excess is silently absorbed and reported via `clamped`.
pub fn apply_adjustment(
    balances: CreditBalances,
    pool: CreditPool,
    amount: i64,
) -> AdjustmentEffect {
    let current = balances.get(pool);
    let new_balance = (current + amount).max(0);
    let applied = new_balance - current;

    AdjustmentEffect {
        balances: balances.with_pool(pool, new_balance),
        applied,
        clamped: applied != amount,
    }
}

/// Result of a committed adjustment.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentOutcome {
    pub tenant_id: Uuid,
    pub pool: CreditPool,
    /// The amount the caller asked for.
    pub requested: i64,
    /// The delta actually applied after flooring at zero.
    pub applied: i64,
    /// True when the requested debit exceeded the pool balance.
    pub clamped: bool,
    pub balances: CreditBalances,
}

/// Service for admin-initiated balance adjustments.
#[derive(Clone)]
pub struct AdjustmentService {
    pool: PgPool,
}

impl AdjustmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically adjust one credit pool of a tenant.
    ///
    /// Aborts with `TenantNotFound` before any write when the tenant row is
    /// missing. On success exactly two rows were written: the tenant update
    /// and the appended `adjustment` record.
    pub async fn adjust(
        &self,
        tenant_id: Uuid,
        target: CreditPool,
        amount: i64,
        reason: Option<&str>,
    ) -> LedgerResult<AdjustmentOutcome> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(i64, i64)> = sqlx::query_as(
            "SELECT subscription_credits, top_off_credits FROM tenants WHERE id = $1 FOR UPDATE",
        )
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (subscription, top_off) =
            current.ok_or(LedgerError::TenantNotFound(tenant_id))?;

        let effect = apply_adjustment(CreditBalances::new(subscription, top_off), target, amount);

        let update_sql = match target {
            CreditPool::Subscription => {
                "UPDATE tenants SET subscription_credits = $1, updated_at = NOW() WHERE id = $2"
            }
            CreditPool::TopOff => {
                "UPDATE tenants SET top_off_credits = $1, updated_at = NOW() WHERE id = $2"
            }
        };

        sqlx::query(update_sql)
            .bind(effect.balances.get(target))
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        let description = reason.unwrap_or("Manual credit adjustment").to_string();

        append_record(
            &mut tx,
            NewTransaction::adjustment(tenant_id, target, amount, effect.balances, description),
        )
        .await?;

        tx.commit().await?;

        if effect.clamped {
            tracing::warn!(
                tenant_id = %tenant_id,
                pool = %target,
                requested = amount,
                applied = effect.applied,
                "Adjustment clamped at zero balance"
            );
        } else {
            tracing::info!(
                tenant_id = %tenant_id,
                pool = %target,
                amount = amount,
                subscription_balance = effect.balances.subscription,
                top_off_balance = effect.balances.top_off,
                "Credit adjustment applied"
            );
        }

        Ok(AdjustmentOutcome {
            tenant_id,
            pool: target,
            requested: amount,
            applied: effect.applied,
            clamped: effect.clamped,
            balances: effect.balances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_increases_target_pool_only() {
        let effect = apply_adjustment(CreditBalances::new(100, 20), CreditPool::Subscription, 50);
        assert_eq!(effect.balances.subscription, 150);
        assert_eq!(effect.balances.top_off, 20);
        assert_eq!(effect.applied, 50);
        assert!(!effect.clamped);
    }

    #[test]
    fn over_debit_floors_at_zero() {
        // Spec scenario: {subscription: 100, topoff: 20}, debit topoff 50.
        let effect = apply_adjustment(CreditBalances::new(100, 20), CreditPool::TopOff, -50);
        assert_eq!(effect.balances.top_off, 0);
        assert_eq!(effect.balances.subscription, 100);
        assert_eq!(effect.applied, -20);
        assert!(effect.clamped);
    }

    #[test]
    fn exact_debit_is_not_clamped() {
        let effect = apply_adjustment(CreditBalances::new(0, 30), CreditPool::TopOff, -30);
        assert_eq!(effect.balances.top_off, 0);
        assert_eq!(effect.applied, -30);
        assert!(!effect.clamped);
    }

    #[test]
    fn credit_from_zero() {
        let effect = apply_adjustment(CreditBalances::new(0, 0), CreditPool::Subscription, 200);
        assert_eq!(effect.balances.subscription, 200);
        assert_eq!(effect.balances.top_off, 0);
        assert!(!effect.clamped);
    }
}
