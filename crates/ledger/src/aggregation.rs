//! Read-side aggregation views
//!
//! Overview totals, per-feature usage breakdown, and top consumers for the
//! admin command center. Nothing is materialized: every view is recomputed
//! from the tenant collection and a capped scan of the transaction log on
//! each read. Empty tables produce empty views, never errors.
//!
//! The summarization step is pure over the fetched rows, so identical
//! inputs always yield identical totals.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::transactions::{TransactionKind, MAX_LOG_FETCH};

/// Tenants with a combined balance under this count as "low credit".
pub const LOW_CREDIT_THRESHOLD: i64 = 50;

/// Transaction-log scan size when the caller does not specify one.
pub const DEFAULT_SCAN_LIMIT: i64 = 250;

/// How many tenants the top-consumers view retains.
pub const TOP_CONSUMER_COUNT: usize = 5;

/// Tenant fields the aggregation reads.
#[derive(Debug, Clone, FromRow)]
pub struct TenantCreditRow {
    pub id: Uuid,
    pub business_name: String,
    pub plan: String,
    pub subscription_credits: i64,
    pub top_off_credits: i64,
    pub credits_used: i64,
}

/// Transaction-log fields the aggregation reads.
#[derive(Debug, Clone, FromRow)]
pub struct LogScanRow {
    pub kind: String,
    pub feature: Option<String>,
    pub amount: i64,
}

/// Platform-wide credit totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditOverview {
    pub tenant_count: i64,
    pub total_subscription_credits: i64,
    pub total_top_off_credits: i64,
    pub total_credits: i64,
    /// Tenants with `total_credits < LOW_CREDIT_THRESHOLD`.
    pub low_credit_tenants: i64,
    pub transactions_scanned: i64,
}

/// Credits consumed by one feature within the scanned window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureUsage {
    pub feature: String,
    pub credits_used: i64,
    pub events: i64,
}

/// A heavy-usage tenant, ranked by cumulative consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopConsumer {
    pub tenant_id: Uuid,
    pub business_name: String,
    pub plan: String,
    pub credits_used: i64,
}

/// The full admin overview payload.
#[derive(Debug, Clone, Serialize)]
pub struct CreditReport {
    pub overview: CreditOverview,
    pub usage_by_feature: Vec<FeatureUsage>,
    pub top_consumers: Vec<TopConsumer>,
}

/// Sum balances and count low-credit tenants.
pub fn summarize_overview(tenants: &[TenantCreditRow], transactions_scanned: i64) -> CreditOverview {
    let total_subscription_credits: i64 = tenants.iter().map(|t| t.subscription_credits).sum();
    let total_top_off_credits: i64 = tenants.iter().map(|t| t.top_off_credits).sum();
    let low_credit_tenants = tenants
        .iter()
        .filter(|t| t.subscription_credits + t.top_off_credits < LOW_CREDIT_THRESHOLD)
        .count() as i64;

    CreditOverview {
        tenant_count: tenants.len() as i64,
        total_subscription_credits,
        total_top_off_credits,
        total_credits: total_subscription_credits + total_top_off_credits,
        low_credit_tenants,
        transactions_scanned,
    }
}

/// Group `usage` records by feature, summing consumed credits.
///
/// Records without a feature tag land under "unknown". Sorted by credits
/// consumed descending, feature name as tiebreak.
pub fn usage_breakdown(rows: &[LogScanRow]) -> Vec<FeatureUsage> {
    let mut by_feature: BTreeMap<&str, (i64, i64)> = BTreeMap::new();

    for row in rows {
        if row.kind != TransactionKind::Usage.as_str() {
            continue;
        }
        let feature = row.feature.as_deref().unwrap_or("unknown");
        let entry = by_feature.entry(feature).or_insert((0, 0));
        entry.0 += row.amount.abs();
        entry.1 += 1;
    }

    let mut breakdown: Vec<FeatureUsage> = by_feature
        .into_iter()
        .map(|(feature, (credits_used, events))| FeatureUsage {
            feature: feature.to_string(),
            credits_used,
            events,
        })
        .collect();

    breakdown.sort_by(|a, b| {
        b.credits_used
            .cmp(&a.credits_used)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    breakdown
}

/// Tenants ranked by cumulative usage, top five retained.
pub fn top_consumers(tenants: &[TenantCreditRow]) -> Vec<TopConsumer> {
    let mut ranked: Vec<&TenantCreditRow> = tenants.iter().filter(|t| t.credits_used > 0).collect();
    ranked.sort_by(|a, b| b.credits_used.cmp(&a.credits_used));

    ranked
        .into_iter()
        .take(TOP_CONSUMER_COUNT)
        .map(|t| TopConsumer {
            tenant_id: t.id,
            business_name: t.business_name.clone(),
            plan: t.plan.clone(),
            credits_used: t.credits_used,
        })
        .collect()
}

/// Query service recomputing the admin views on each call.
#[derive(Clone)]
pub struct AggregationService {
    pool: PgPool,
}

impl AggregationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build the full report from a fresh scan.
    pub async fn report(&self, scan_limit: Option<i64>) -> LedgerResult<CreditReport> {
        let scan_limit = scan_limit.unwrap_or(DEFAULT_SCAN_LIMIT).clamp(1, MAX_LOG_FETCH);

        let tenants: Vec<TenantCreditRow> = sqlx::query_as(
            r#"
            SELECT id, business_name, plan,
                   subscription_credits, top_off_credits, credits_used
            FROM tenants
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let log_rows: Vec<LogScanRow> = sqlx::query_as(
            r#"
            SELECT kind, feature, amount
            FROM credit_transactions
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(scan_limit)
        .fetch_all(&self.pool)
        .await?;

        let scanned = log_rows.len() as i64;

        Ok(CreditReport {
            overview: summarize_overview(&tenants, scanned),
            usage_by_feature: usage_breakdown(&log_rows),
            top_consumers: top_consumers(&tenants),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(name: &str, subscription: i64, top_off: i64, used: i64) -> TenantCreditRow {
        TenantCreditRow {
            id: Uuid::new_v4(),
            business_name: name.to_string(),
            plan: "starter".to_string(),
            subscription_credits: subscription,
            top_off_credits: top_off,
            credits_used: used,
        }
    }

    fn usage_row(feature: &str, amount: i64) -> LogScanRow {
        LogScanRow {
            kind: "usage".to_string(),
            feature: Some(feature.to_string()),
            amount,
        }
    }

    #[test]
    fn overview_sums_pools_and_counts_low_credit() {
        let tenants = vec![
            tenant("Daily Bugle", 100, 20, 0),
            tenant("Gotham Gazette", 10, 5, 0),
            tenant("Smallville Times", 0, 49, 0),
        ];

        let overview = summarize_overview(&tenants, 3);
        assert_eq!(overview.tenant_count, 3);
        assert_eq!(overview.total_subscription_credits, 110);
        assert_eq!(overview.total_top_off_credits, 74);
        assert_eq!(overview.total_credits, 184);
        assert_eq!(overview.low_credit_tenants, 2);
        assert_eq!(overview.transactions_scanned, 3);
    }

    #[test]
    fn overview_of_nothing_is_zero() {
        let overview = summarize_overview(&[], 0);
        assert_eq!(overview.tenant_count, 0);
        assert_eq!(overview.total_credits, 0);
        assert_eq!(overview.low_credit_tenants, 0);
    }

    #[test]
    fn breakdown_groups_by_feature_and_ignores_non_usage() {
        let rows = vec![
            usage_row("article_generation", -10),
            usage_row("article_generation", -15),
            usage_row("image_search", -5),
            LogScanRow {
                kind: "adjustment".to_string(),
                feature: None,
                amount: -100,
            },
        ];

        let breakdown = usage_breakdown(&rows);
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].feature, "article_generation");
        assert_eq!(breakdown[0].credits_used, 25);
        assert_eq!(breakdown[0].events, 2);
        assert_eq!(breakdown[1].feature, "image_search");
        assert_eq!(breakdown[1].credits_used, 5);
    }

    #[test]
    fn breakdown_of_empty_log_is_empty() {
        assert!(usage_breakdown(&[]).is_empty());
    }

    #[test]
    fn summarization_is_deterministic() {
        let tenants = vec![tenant("Daily Bugle", 40, 0, 120)];
        let rows = vec![usage_row("text_to_speech", -60)];

        let first = (
            summarize_overview(&tenants, 1),
            usage_breakdown(&rows),
            top_consumers(&tenants),
        );
        let second = (
            summarize_overview(&tenants, 1),
            usage_breakdown(&rows),
            top_consumers(&tenants),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn top_consumers_ranks_and_caps_at_five() {
        let tenants: Vec<TenantCreditRow> = (0..8)
            .map(|i| tenant(&format!("Paper {i}"), 0, 0, i * 10))
            .collect();

        let top = top_consumers(&tenants);
        assert_eq!(top.len(), TOP_CONSUMER_COUNT);
        assert_eq!(top[0].credits_used, 70);
        assert!(top.windows(2).all(|w| w[0].credits_used >= w[1].credits_used));
    }

    #[test]
    fn top_consumers_skips_unused_tenants() {
        let tenants = vec![tenant("Idle Weekly", 100, 100, 0)];
        assert!(top_consumers(&tenants).is_empty());
    }
}
