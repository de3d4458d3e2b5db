//! Stripe webhook handling
//!
//! The inbound billing integration: top-off purchases arrive as completed
//! checkout sessions, subscription-cycle renewals as paid invoices. The
//! ledger never calls out to Stripe; it only consumes verified events.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{CheckoutSession, CheckoutSessionMode, Event, EventObject, EventType, Invoice, Webhook};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::grants::GrantService;
use crate::tenant::TenantStore;

type HmacSha256 = Hmac<Sha256>;

/// Signature timestamp tolerance in seconds.
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Webhook handler for Stripe events.
pub struct WebhookHandler {
    pool: PgPool,
    webhook_secret: String,
    tenants: TenantStore,
    grants: GrantService,
}

impl WebhookHandler {
    pub fn new(pool: PgPool, webhook_secret: String) -> Self {
        let tenants = TenantStore::new(pool.clone());
        let grants = GrantService::new(pool.clone());
        Self {
            pool,
            webhook_secret,
            tenants,
            grants,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.webhook_secret.is_empty()
    }

    /// Verify and parse a Stripe webhook event.
    ///
    /// Tries the library verification first, then falls back to manual
    /// signature verification for Stripe API versions newer than the
    /// library's pinned one.
    pub fn verify_event(&self, payload: &str, signature: &str) -> LedgerResult<Event> {
        if self.webhook_secret.is_empty() {
            tracing::error!("Rejecting webhook: STRIPE_WEBHOOK_SECRET not configured");
            return Err(LedgerError::WebhookSignatureInvalid);
        }

        match Webhook::construct_event(payload, signature, &self.webhook_secret) {
            Ok(event) => return Ok(event),
            Err(e) => {
                tracing::warn!(
                    stripe_error = %e,
                    "Standard webhook parsing failed, trying manual verification"
                );
            }
        }

        // Signature header format: t=timestamp,v1=signature,v0=signature
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<String> = None;

        for part in signature.split(',') {
            if let Some((key, value)) = part.split_once('=') {
                match key {
                    "t" => timestamp = value.parse().ok(),
                    "v1" => v1_signature = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or(LedgerError::WebhookSignatureInvalid)?;
        let v1_signature = v1_signature.ok_or(LedgerError::WebhookSignatureInvalid)?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|_| LedgerError::WebhookSignatureInvalid)?
            .as_secs() as i64;

        if (now - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
            tracing::error!(
                timestamp = timestamp,
                skew = (now - timestamp).abs(),
                "Webhook timestamp outside tolerance"
            );
            return Err(LedgerError::WebhookSignatureInvalid);
        }

        // The whsec_ prefix marks the shared secret, not part of the key
        let secret_key = self
            .webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(&self.webhook_secret);
        let signed_payload = format!("{}.{}", timestamp, payload);

        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .map_err(|_| LedgerError::WebhookSignatureInvalid)?;
        mac.update(signed_payload.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            tracing::error!("Webhook signature mismatch");
            return Err(LedgerError::WebhookSignatureInvalid);
        }

        let event: Event = serde_json::from_str(payload)
            .map_err(|e| LedgerError::WebhookPayload(format!("event JSON: {e}")))?;

        tracing::info!(
            event_type = %event.type_,
            event_id = %event.id,
            "Manual webhook verification passed"
        );

        Ok(event)
    }

    /// Handle a verified Stripe event.
    ///
    /// Claims the event id atomically before processing (INSERT ... ON
    /// CONFLICT), so a replayed delivery is acknowledged without a second
    /// grant.
    pub async fn handle_event(&self, event: Event) -> LedgerResult<()> {
        let event_id = event.id.to_string();
        let event_type = event.type_.to_string();

        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO stripe_webhook_events (stripe_event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (stripe_event_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&event_id)
        .bind(&event_type)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_none() {
            tracing::info!(
                event_id = %event_id,
                event_type = %event_type,
                "Duplicate webhook event ignored"
            );
            return Ok(());
        }

        let result = self.process_event(event).await;

        let (processing_result, error_message) = match &result {
            Ok(()) => ("success", None),
            Err(e) => ("error", Some(e.to_string())),
        };

        if let Err(e) = sqlx::query(
            r#"
            UPDATE stripe_webhook_events
            SET processing_result = $1, error_message = $2
            WHERE stripe_event_id = $3
            "#,
        )
        .bind(processing_result)
        .bind(&error_message)
        .bind(&event_id)
        .execute(&self.pool)
        .await
        {
            tracing::error!(
                event_id = %event_id,
                error = %e,
                "Failed to record webhook processing result"
            );
        }

        result
    }

    async fn process_event(&self, event: Event) -> LedgerResult<()> {
        match event.type_ {
            EventType::CheckoutSessionCompleted => match event.data.object {
                EventObject::CheckoutSession(session) => {
                    self.handle_checkout_completed(session).await
                }
                _ => Err(LedgerError::WebhookPayload(
                    "checkout.session.completed without session object".to_string(),
                )),
            },
            EventType::InvoicePaid => match event.data.object {
                EventObject::Invoice(invoice) => self.handle_invoice_paid(invoice).await,
                _ => Err(LedgerError::WebhookPayload(
                    "invoice.paid without invoice object".to_string(),
                )),
            },
            other => {
                tracing::debug!(event_type = %other, "Ignoring unhandled webhook event type");
                Ok(())
            }
        }
    }

    /// A completed payment-mode checkout is a top-off purchase. The wizard
    /// puts the tenant id and credit count in the session metadata.
    async fn handle_checkout_completed(&self, session: CheckoutSession) -> LedgerResult<()> {
        if session.mode != CheckoutSessionMode::Payment {
            // Subscription-mode checkouts are handled via invoice.paid
            return Ok(());
        }

        let metadata = session.metadata.unwrap_or_default();

        let tenant_id = metadata
            .get("tenant_id")
            .ok_or_else(|| LedgerError::WebhookPayload("missing tenant_id metadata".to_string()))?;
        let tenant_id = Uuid::parse_str(tenant_id)
            .map_err(|_| LedgerError::WebhookPayload(format!("bad tenant_id '{tenant_id}'")))?;

        let credits: i64 = metadata
            .get("credits")
            .ok_or_else(|| LedgerError::WebhookPayload("missing credits metadata".to_string()))?
            .parse()
            .map_err(|_| LedgerError::WebhookPayload("credits metadata not numeric".to_string()))?;

        let balances = self
            .grants
            .grant_top_off(tenant_id, credits, "Top-off purchase")
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            credits = credits,
            top_off_balance = balances.top_off,
            "Top-off purchase credited"
        );

        Ok(())
    }

    /// A paid subscription invoice resets the tenant's subscription pool
    /// for the new billing cycle.
    async fn handle_invoice_paid(&self, invoice: Invoice) -> LedgerResult<()> {
        if invoice.subscription.is_none() {
            // One-off invoices carry no cycle to renew
            return Ok(());
        }

        let customer_id = match invoice.customer.as_ref() {
            Some(stripe::Expandable::Id(id)) => id.to_string(),
            Some(stripe::Expandable::Object(customer)) => customer.id.to_string(),
            None => {
                return Err(LedgerError::WebhookPayload(
                    "invoice.paid without customer".to_string(),
                ))
            }
        };

        let Some(tenant) = self.tenants.find_by_stripe_customer(&customer_id).await? else {
            tracing::warn!(
                customer_id = %customer_id,
                "Paid invoice for unknown Stripe customer"
            );
            return Ok(());
        };

        let outcome = self.grants.renew_subscription_credits(tenant.id).await?;

        tracing::info!(
            tenant_id = %tenant.id,
            plan = %outcome.plan,
            allowance = outcome.allowance,
            "Subscription renewed from paid invoice"
        );

        Ok(())
    }
}
