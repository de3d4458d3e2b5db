//! Admin command-center routes
//!
//! Tenant roster, credit adjustments, the activity feed, and the overview
//! stats. All handlers run behind the admin-key middleware and assume the
//! caller is authorized.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use gazette_ledger::{
    AdjustmentOutcome, CreditPool, CreditReport, CreditTransaction, NewTenant, Plan, Tenant,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListTenantsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub plan: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TenantSummary {
    pub id: Uuid,
    pub business_name: String,
    pub plan: String,
    pub status: String,
    pub subscription_credits: i64,
    pub top_off_credits: i64,
    pub total_credits: i64,
    pub credits_used: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Tenant> for TenantSummary {
    fn from(tenant: Tenant) -> Self {
        let total_credits = tenant.total_credits();
        Self {
            id: tenant.id,
            business_name: tenant.business_name,
            plan: tenant.plan,
            status: tenant.status,
            subscription_credits: tenant.subscription_credits,
            top_off_credits: tenant.top_off_credits,
            total_credits,
            credits_used: tenant.credits_used,
            created_at: tenant.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TenantListResponse {
    pub tenants: Vec<TenantSummary>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub business_name: String,
    pub plan: String,
    pub stripe_customer_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TenantDetailResponse {
    #[serde(flatten)]
    pub tenant: TenantSummary,
    pub recent_transactions: Vec<CreditTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustCreditsRequest {
    /// "subscription" or "topoff"
    pub pool: String,
    /// Signed amount: positive credits, negative debits
    pub amount: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdjustCreditsResponse {
    pub message: String,
    pub adjustment: AdjustmentOutcome,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<CreditTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    pub scan_limit: Option<i64>,
}

// =============================================================================
// Handlers
// =============================================================================

/// List tenants with balances, paginated.
pub async fn list_tenants(
    State(state): State<AppState>,
    Query(query): Query<ListTenantsQuery>,
) -> ApiResult<Json<TenantListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).clamp(1, 100);

    if let Some(ref plan) = query.plan {
        // Reject typos up front instead of silently matching nothing
        plan.parse::<Plan>()?;
    }

    let (tenants, total) = state
        .ledger
        .tenants
        .list(page, limit, query.search.as_deref(), query.plan.as_deref())
        .await?;

    Ok(Json(TenantListResponse {
        tenants: tenants.into_iter().map(TenantSummary::from).collect(),
        total,
        page,
        limit,
    }))
}

/// Create a tenant ledger row (called by the provisioning flow).
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(req): Json<CreateTenantRequest>,
) -> ApiResult<Json<TenantSummary>> {
    let business_name = req.business_name.trim();
    if business_name.is_empty() {
        return Err(ApiError::Validation("business_name is required".to_string()));
    }
    let plan: Plan = req.plan.parse()?;

    let tenant = state
        .ledger
        .tenants
        .create(NewTenant {
            business_name: business_name.to_string(),
            plan,
            stripe_customer_id: req.stripe_customer_id,
        })
        .await?;

    Ok(Json(TenantSummary::from(tenant)))
}

/// Single tenant with its recent ledger activity.
pub async fn get_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<TenantDetailResponse>> {
    let tenant = state.ledger.tenants.require(tenant_id).await?;
    let recent_transactions = state
        .ledger
        .transactions
        .list_for_tenant(tenant_id, 20)
        .await?;

    Ok(Json(TenantDetailResponse {
        tenant: TenantSummary::from(tenant),
        recent_transactions,
    }))
}

/// Apply an out-of-band credit adjustment to one pool.
pub async fn adjust_credits(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<AdjustCreditsRequest>,
) -> ApiResult<Json<AdjustCreditsResponse>> {
    if req.amount == 0 {
        return Err(ApiError::Validation("amount must be non-zero".to_string()));
    }
    let pool: CreditPool = req.pool.parse()?;

    let adjustment = state
        .ledger
        .adjustments
        .adjust(tenant_id, pool, req.amount, req.reason.as_deref())
        .await?;

    let message = if adjustment.clamped {
        format!(
            "Adjustment applied; {} pool floored at zero ({} of {} applied)",
            pool, adjustment.applied, adjustment.requested
        )
    } else {
        "Adjustment applied".to_string()
    };

    Ok(Json(AdjustCreditsResponse {
        message,
        adjustment,
    }))
}

/// Per-tenant transaction log page, newest first.
pub async fn list_tenant_transactions(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<TransactionsQuery>,
) -> ApiResult<Json<TransactionListResponse>> {
    // 404 for unknown tenants rather than an empty page
    state.ledger.tenants.require(tenant_id).await?;

    let transactions = state
        .ledger
        .transactions
        .list_for_tenant(tenant_id, query.limit.unwrap_or(50))
        .await?;

    Ok(Json(TransactionListResponse { transactions }))
}

/// Platform-wide activity feed, newest first.
pub async fn recent_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionsQuery>,
) -> ApiResult<Json<TransactionListResponse>> {
    let transactions = state
        .ledger
        .transactions
        .list_recent(query.limit.unwrap_or(100))
        .await?;

    Ok(Json(TransactionListResponse { transactions }))
}

/// Credit overview: totals, per-feature breakdown, top consumers.
pub async fn credit_overview(
    State(state): State<AppState>,
    Query(query): Query<OverviewQuery>,
) -> ApiResult<Json<CreditReport>> {
    let report = state.ledger.aggregation.report(query.scan_limit).await?;
    Ok(Json(report))
}
