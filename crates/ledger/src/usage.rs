//! Usage metering
//!
//! Debits a tenant's pools when an AI feature consumes credits.
//! Subscription credits drain first (they reset at renewal), then the
//! remainder spills into the top-off pool; both floor at zero. Usage never
//! rejects a request for insufficient balance -- entitlement gating happens
//! upstream of the ledger.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::tenant::CreditBalances;
use crate::transactions::{append_record, NewTransaction};

/// The AI features metered against tenant credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageFeature {
    ArticleGeneration,
    ImageGeneration,
    TextToSpeech,
    ImageSearch,
}

impl UsageFeature {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageFeature::ArticleGeneration => "article_generation",
            UsageFeature::ImageGeneration => "image_generation",
            UsageFeature::TextToSpeech => "text_to_speech",
            UsageFeature::ImageSearch => "image_search",
        }
    }
}

impl std::str::FromStr for UsageFeature {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "article_generation" => Ok(UsageFeature::ArticleGeneration),
            "image_generation" => Ok(UsageFeature::ImageGeneration),
            "text_to_speech" => Ok(UsageFeature::TextToSpeech),
            "image_search" => Ok(UsageFeature::ImageSearch),
            other => Err(LedgerError::InvalidFeature(other.to_string())),
        }
    }
}

impl std::fmt::Display for UsageFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effect of a usage debit, before persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageEffect {
    pub balances: CreditBalances,
    /// Credits actually consumed across both pools (<= requested).
    pub consumed: i64,
    pub from_subscription: i64,
    pub from_top_off: i64,
}

/// Drain `credits` from the subscription pool first, spilling into top-off.
pub fn apply_usage(balances: CreditBalances, credits: i64) -> UsageEffect {
    let credits = credits.max(0);

    let from_subscription = balances.subscription.min(credits);
    let remainder = credits - from_subscription;
    let from_top_off = balances.top_off.min(remainder);

    UsageEffect {
        balances: CreditBalances::new(
            balances.subscription - from_subscription,
            balances.top_off - from_top_off,
        ),
        consumed: from_subscription + from_top_off,
        from_subscription,
        from_top_off,
    }
}

/// Result of a committed usage debit.
#[derive(Debug, Clone, Serialize)]
pub struct UsageOutcome {
    pub tenant_id: Uuid,
    pub feature: UsageFeature,
    pub requested: i64,
    pub consumed: i64,
    pub balances: CreditBalances,
}

/// Service recording feature consumption against tenant balances.
#[derive(Clone)]
pub struct UsageMeter {
    pool: PgPool,
}

impl UsageMeter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically debit a tenant for one feature invocation.
    ///
    /// Same transactional shape as the adjustment operation: row lock,
    /// pool update, `credits_used` increment, log append, one commit.
    pub async fn record_usage(
        &self,
        tenant_id: Uuid,
        feature: UsageFeature,
        credits: i64,
        description: Option<&str>,
    ) -> LedgerResult<UsageOutcome> {
        let credits = credits.max(0);

        let mut tx = self.pool.begin().await?;

        let current: Option<(i64, i64)> = sqlx::query_as(
            "SELECT subscription_credits, top_off_credits FROM tenants WHERE id = $1 FOR UPDATE",
        )
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (subscription, top_off) =
            current.ok_or(LedgerError::TenantNotFound(tenant_id))?;

        let effect = apply_usage(CreditBalances::new(subscription, top_off), credits);

        sqlx::query(
            r#"
            UPDATE tenants SET
                subscription_credits = $1,
                top_off_credits = $2,
                credits_used = credits_used + $3,
                updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(effect.balances.subscription)
        .bind(effect.balances.top_off)
        .bind(effect.consumed)
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} usage", feature));

        append_record(
            &mut tx,
            NewTransaction::usage(
                tenant_id,
                credits,
                effect.balances,
                feature.as_str().to_string(),
                description,
            ),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            tenant_id = %tenant_id,
            feature = %feature,
            requested = credits,
            consumed = effect.consumed,
            subscription_balance = effect.balances.subscription,
            top_off_balance = effect.balances.top_off,
            "Usage recorded"
        );

        Ok(UsageOutcome {
            tenant_id,
            feature,
            requested: credits,
            consumed: effect.consumed,
            balances: effect.balances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_drains_subscription_first() {
        let effect = apply_usage(CreditBalances::new(100, 50), 30);
        assert_eq!(effect.from_subscription, 30);
        assert_eq!(effect.from_top_off, 0);
        assert_eq!(effect.balances.subscription, 70);
        assert_eq!(effect.balances.top_off, 50);
    }

    #[test]
    fn usage_spills_into_top_off() {
        let effect = apply_usage(CreditBalances::new(10, 50), 30);
        assert_eq!(effect.from_subscription, 10);
        assert_eq!(effect.from_top_off, 20);
        assert_eq!(effect.balances.subscription, 0);
        assert_eq!(effect.balances.top_off, 30);
        assert_eq!(effect.consumed, 30);
    }

    #[test]
    fn usage_floors_both_pools_at_zero() {
        let effect = apply_usage(CreditBalances::new(10, 5), 100);
        assert_eq!(effect.balances.subscription, 0);
        assert_eq!(effect.balances.top_off, 0);
        assert_eq!(effect.consumed, 15);
    }

    #[test]
    fn negative_request_consumes_nothing() {
        let effect = apply_usage(CreditBalances::new(10, 5), -20);
        assert_eq!(effect.consumed, 0);
        assert_eq!(effect.balances, CreditBalances::new(10, 5));
    }

    #[test]
    fn feature_parse_round_trip() {
        for feature in [
            UsageFeature::ArticleGeneration,
            UsageFeature::ImageGeneration,
            UsageFeature::TextToSpeech,
            UsageFeature::ImageSearch,
        ] {
            assert_eq!(feature.as_str().parse::<UsageFeature>().unwrap(), feature);
        }
    }
}
