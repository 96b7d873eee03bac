//! Stripe webhook handling
//!
//! Verifies the `stripe-signature` header, classifies the event and, for
//! `invoice.paid`, reconciles the paying customer's plan. Every other event
//! type is acknowledged without touching state.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use transactiq_shared::Gateway;

use crate::client::StripeGateway;
use crate::error::{BillingError, BillingResult};
use crate::reconcile::{LookupKey, ReconcileOutcome, Reconciler};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed delivery
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// What a webhook delivery resulted in. All variants are acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Reconciled(ReconcileOutcome),
    /// Solidgate one-time payment acknowledgment; logged only
    OneTimePayment { order_id: Option<String> },
    Ignored { reason: String },
}

impl WebhookOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        WebhookOutcome::Ignored {
            reason: reason.into(),
        }
    }
}

/// Stripe id that may arrive either bare or expanded into an object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    id: Option<String>,
    customer: Option<Expandable>,
    subscription: Option<Expandable>,
    /// Newer API versions moved the subscription under `parent`
    parent: Option<InvoiceParent>,
}

#[derive(Debug, Deserialize)]
struct InvoiceParent {
    subscription_details: Option<SubscriptionDetails>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionDetails {
    subscription: Option<Expandable>,
}

/// The fields of a paid invoice reconciliation needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaidInvoice {
    pub invoice_id: Option<String>,
    pub customer_id: String,
    pub subscription_id: Option<String>,
}

/// A verified Stripe event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StripeEvent {
    InvoicePaid { event_id: String, invoice: PaidInvoice },
    Other { event_id: String, event_type: String },
}

impl StripeEvent {
    /// Classify a raw event body
    pub fn parse(payload: &str) -> BillingResult<Self> {
        let envelope: EventEnvelope = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::InvalidPayload(e.to_string())
        })?;

        match envelope.event_type.as_str() {
            "invoice.paid" => {
                let invoice: InvoiceObject = serde_json::from_value(envelope.data.object)
                    .map_err(|e| BillingError::InvalidPayload(format!("Expected Invoice: {}", e)))?;

                let customer_id = invoice
                    .customer
                    .map(Expandable::into_id)
                    .ok_or_else(|| {
                        BillingError::InvalidPayload("No customer on invoice".to_string())
                    })?;

                let subscription_id = invoice
                    .subscription
                    .or_else(|| {
                        invoice
                            .parent
                            .and_then(|p| p.subscription_details)
                            .and_then(|d| d.subscription)
                    })
                    .map(Expandable::into_id);

                Ok(StripeEvent::InvoicePaid {
                    event_id: envelope.id,
                    invoice: PaidInvoice {
                        invoice_id: invoice.id,
                        customer_id,
                        subscription_id,
                    },
                })
            }
            _ => Ok(StripeEvent::Other {
                event_id: envelope.id,
                event_type: envelope.event_type,
            }),
        }
    }

    pub fn event_id(&self) -> &str {
        match self {
            StripeEvent::InvoicePaid { event_id, .. } | StripeEvent::Other { event_id, .. } => {
                event_id
            }
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            StripeEvent::InvoicePaid { .. } => "invoice.paid",
            StripeEvent::Other { event_type, .. } => event_type,
        }
    }
}

/// `hex(HMAC-SHA256(secret, "{timestamp}.{payload}"))`
pub fn compute_signature(secret: &str, timestamp: i64, payload: &str) -> BillingResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        tracing::error!("Invalid webhook secret key");
        BillingError::WebhookSignatureInvalid
    })?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Webhook handler for Stripe events
#[derive(Clone)]
pub struct WebhookHandler {
    stripe: Arc<dyn StripeGateway>,
    reconciler: Reconciler,
    webhook_secret: String,
}

impl WebhookHandler {
    pub fn new(stripe: Arc<dyn StripeGateway>, reconciler: Reconciler, webhook_secret: &str) -> Self {
        Self {
            stripe,
            reconciler,
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Verify and parse a Stripe webhook event
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<StripeEvent> {
        self.verify_event_at(payload, signature, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Verify against an explicit clock (unix seconds)
    pub fn verify_event_at(
        &self,
        payload: &str,
        signature: &str,
        now: i64,
    ) -> BillingResult<StripeEvent> {
        // Header format: t=timestamp,v1=signature[,v1=signature...][,v0=...]
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures: Vec<&str> = Vec::new();

        for part in signature.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => v1_signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::warn!("Missing timestamp in signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        if v1_signatures.is_empty() {
            tracing::warn!("Missing v1 signature in signature header");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let diff = now.abs_diff(timestamp);
        if diff > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
            tracing::warn!(
                timestamp = timestamp,
                now = now,
                diff = diff,
                "Webhook timestamp outside tolerance"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let computed = compute_signature(&self.webhook_secret, timestamp, payload)?;
        let matched = v1_signatures
            .iter()
            .any(|candidate| bool::from(computed.as_bytes().ct_eq(candidate.as_bytes())));

        if !matched {
            tracing::warn!("Stripe webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let event = StripeEvent::parse(payload)?;

        tracing::info!(
            event_type = %event.event_type(),
            event_id = %event.event_id(),
            "Verified Stripe webhook event"
        );

        Ok(event)
    }

    /// Handle a verified Stripe event
    pub async fn handle_event(&self, event: StripeEvent) -> BillingResult<WebhookOutcome> {
        self.handle_event_at(event, OffsetDateTime::now_utc()).await
    }

    pub async fn handle_event_at(
        &self,
        event: StripeEvent,
        now: OffsetDateTime,
    ) -> BillingResult<WebhookOutcome> {
        match event {
            StripeEvent::InvoicePaid { event_id, invoice } => {
                self.handle_invoice_paid(&event_id, invoice, now).await
            }
            StripeEvent::Other {
                event_id,
                event_type,
            } => {
                tracing::info!(
                    event_type = %event_type,
                    event_id = %event_id,
                    "Received unhandled Stripe event type - no handler configured"
                );
                Ok(WebhookOutcome::ignored(format!("unhandled event type {}", event_type)))
            }
        }
    }

    async fn handle_invoice_paid(
        &self,
        event_id: &str,
        invoice: PaidInvoice,
        now: OffsetDateTime,
    ) -> BillingResult<WebhookOutcome> {
        let Some(user) = self
            .reconciler
            .find_user_for_reconciliation(LookupKey::StripeCustomer(&invoice.customer_id))
            .await?
        else {
            return Ok(WebhookOutcome::Reconciled(ReconcileOutcome::UserNotFound));
        };

        let Some(subscription_id) = invoice.subscription_id.as_deref() else {
            tracing::info!(
                event_id = %event_id,
                invoice_id = ?invoice.invoice_id,
                user_id = %user.id,
                "Paid invoice has no subscription, nothing to reconcile"
            );
            return Ok(WebhookOutcome::ignored("invoice without subscription"));
        };

        let Some(price_id) = self.stripe.subscription_price_id(subscription_id).await? else {
            tracing::warn!(
                event_id = %event_id,
                subscription_id = %subscription_id,
                "Subscription has no priced items"
            );
            return Ok(WebhookOutcome::Reconciled(ReconcileOutcome::UnknownProduct {
                product_id: String::new(),
            }));
        };

        let outcome = self
            .reconciler
            .reconcile_user(&user, Gateway::Stripe, &price_id, now)
            .await?;

        tracing::info!(
            event_id = %event_id,
            invoice_id = ?invoice.invoice_id,
            subscription_id = %subscription_id,
            price_id = %price_id,
            outcome = ?outcome,
            "Processed invoice.paid"
        );

        Ok(WebhookOutcome::Reconciled(outcome))
    }
}
