//! Append-only credit transaction log
//!
//! One record per ledger mutation, written inside the same database
//! transaction as the mutation itself. Records carry the requested amount
//! (which may exceed the applied change when clamping occurred) and a
//! post-mutation snapshot of both pool balances. Nothing ever updates or
//! deletes a record.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::tenant::CreditBalances;

/// Hard cap on how many records a single log read returns.
pub const MAX_LOG_FETCH: i64 = 500;

/// What kind of mutation a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    #[serde(rename = "adjustment")]
    Adjustment,
    #[serde(rename = "usage")]
    Usage,
    #[serde(rename = "subscription")]
    Subscription,
    #[serde(rename = "topoff")]
    TopOff,
    #[serde(rename = "bonus")]
    Bonus,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Adjustment => "adjustment",
            TransactionKind::Usage => "usage",
            TransactionKind::Subscription => "subscription",
            TransactionKind::TopOff => "topoff",
            TransactionKind::Bonus => "bonus",
        }
    }
}

/// Which pool a single-pool mutation targeted.
///
/// Usage debits may touch both pools and carry no pool tag; the balance
/// snapshot on the record disambiguates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditPool {
    #[serde(rename = "subscription")]
    Subscription,
    #[serde(rename = "topoff")]
    TopOff,
}

impl CreditPool {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditPool::Subscription => "subscription",
            CreditPool::TopOff => "topoff",
        }
    }
}

impl std::str::FromStr for CreditPool {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subscription" => Ok(CreditPool::Subscription),
            "topoff" => Ok(CreditPool::TopOff),
            other => Err(LedgerError::InvalidPool(other.to_string())),
        }
    }
}

impl std::fmt::Display for CreditPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted transaction record.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: String,
    pub credit_pool: Option<String>,
    /// Requested amount: positive = credit, negative = debit. May be larger
    /// in magnitude than the change actually applied (clamping).
    pub amount: i64,
    pub subscription_balance: i64,
    pub top_off_balance: i64,
    pub feature: Option<String>,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A record about to be appended.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub tenant_id: Uuid,
    pub kind: TransactionKind,
    pub credit_pool: Option<CreditPool>,
    pub amount: i64,
    pub balances: CreditBalances,
    pub feature: Option<String>,
    pub description: String,
}

impl NewTransaction {
    pub fn adjustment(
        tenant_id: Uuid,
        pool: CreditPool,
        amount: i64,
        balances: CreditBalances,
        description: String,
    ) -> Self {
        Self {
            tenant_id,
            kind: TransactionKind::Adjustment,
            credit_pool: Some(pool),
            amount,
            balances,
            feature: None,
            description,
        }
    }

    /// Usage debits record the requested amount as negative and no pool tag.
    pub fn usage(
        tenant_id: Uuid,
        credits: i64,
        balances: CreditBalances,
        feature: String,
        description: String,
    ) -> Self {
        Self {
            tenant_id,
            kind: TransactionKind::Usage,
            credit_pool: None,
            amount: -credits.abs(),
            balances,
            feature: Some(feature),
            description,
        }
    }

    pub fn subscription(
        tenant_id: Uuid,
        amount: i64,
        balances: CreditBalances,
        description: String,
    ) -> Self {
        Self {
            tenant_id,
            kind: TransactionKind::Subscription,
            credit_pool: Some(CreditPool::Subscription),
            amount,
            balances,
            feature: None,
            description,
        }
    }

    pub fn top_off(
        tenant_id: Uuid,
        credits: i64,
        balances: CreditBalances,
        description: String,
    ) -> Self {
        Self {
            tenant_id,
            kind: TransactionKind::TopOff,
            credit_pool: Some(CreditPool::TopOff),
            amount: credits,
            balances,
            feature: None,
            description,
        }
    }

    pub fn bonus(
        tenant_id: Uuid,
        pool: CreditPool,
        credits: i64,
        balances: CreditBalances,
        description: String,
    ) -> Self {
        Self {
            tenant_id,
            kind: TransactionKind::Bonus,
            credit_pool: Some(pool),
            amount: credits,
            balances,
            feature: None,
            description,
        }
    }
}

/// Append a record inside an open database transaction.
///
/// Every mutation service calls this between its row update and its commit,
/// so the record exists if and only if the mutation was durably applied.
pub async fn append_record(
    tx: &mut Transaction<'_, Postgres>,
    record: NewTransaction,
) -> LedgerResult<Uuid> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO credit_transactions (
            tenant_id, kind, credit_pool, amount,
            subscription_balance, top_off_balance, feature, description
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(record.tenant_id)
    .bind(record.kind.as_str())
    .bind(record.credit_pool.map(|p| p.as_str()))
    .bind(record.amount)
    .bind(record.balances.subscription)
    .bind(record.balances.top_off)
    .bind(&record.feature)
    .bind(&record.description)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.0)
}

/// Read access to the transaction log.
#[derive(Clone)]
pub struct TransactionLog {
    pool: PgPool,
}

impl TransactionLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent records across all tenants, newest first.
    pub async fn list_recent(&self, limit: i64) -> LedgerResult<Vec<CreditTransaction>> {
        let limit = limit.clamp(1, MAX_LOG_FETCH);
        let records = sqlx::query_as(
            r#"
            SELECT * FROM credit_transactions
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Most recent records for one tenant, newest first.
    pub async fn list_for_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
    ) -> LedgerResult<Vec<CreditTransaction>> {
        let limit = limit.clamp(1, MAX_LOG_FETCH);
        let records = sqlx::query_as(
            r#"
            SELECT * FROM credit_transactions
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_parse_round_trip() {
        assert_eq!(
            "subscription".parse::<CreditPool>().unwrap(),
            CreditPool::Subscription
        );
        assert_eq!("topoff".parse::<CreditPool>().unwrap(), CreditPool::TopOff);
        assert!("top_off".parse::<CreditPool>().is_err());
    }

    #[test]
    fn usage_records_are_always_debits() {
        let tenant_id = Uuid::new_v4();
        let record = NewTransaction::usage(
            tenant_id,
            40,
            CreditBalances::new(60, 0),
            "article_generation".to_string(),
            "Generated article".to_string(),
        );
        assert_eq!(record.amount, -40);
        assert!(record.credit_pool.is_none());
    }

    #[test]
    fn adjustment_keeps_requested_amount() {
        let tenant_id = Uuid::new_v4();
        // Requested -50 against a pool of 20: the record keeps -50, the
        // snapshot carries the clamped balance.
        let record = NewTransaction::adjustment(
            tenant_id,
            CreditPool::TopOff,
            -50,
            CreditBalances::new(100, 0),
            "Support goodwill".to_string(),
        );
        assert_eq!(record.amount, -50);
        assert_eq!(record.balances.top_off, 0);
    }
}
