//! Solidgate webhook handling
//!
//! Deliveries come in two shapes. Subscription lifecycle callbacks carry a
//! `callback_type` and identify the user by email; order notifications carry
//! `order`/`order_metadata` and are only acknowledged.

use serde_json::{Map, Value};
use time::OffsetDateTime;
use transactiq_shared::Gateway;

use crate::error::{BillingError, BillingResult};
use crate::reconcile::{LookupKey, ReconcileOutcome, Reconciler};
use crate::solidgate::SolidgateClient;
use crate::webhooks::WebhookOutcome;

/// `order_metadata.plan_id` of a one-time payment order
pub const ONE_TIME_PAYMENT_PLAN_ID: i64 = 5;

const APPROVED_ORDER_STATUSES: [&str; 2] = ["auth_ok", "approved"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackType {
    Active,
    Renew,
    Other(String),
}

impl CallbackType {
    fn parse(value: &str) -> Self {
        match value {
            "active" => CallbackType::Active,
            "renew" => CallbackType::Renew,
            other => CallbackType::Other(other.to_string()),
        }
    }
}

/// Subscription lifecycle event the plan state reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionCallback {
    pub customer_email: String,
    pub product_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolidgateEvent {
    Active(SubscriptionCallback),
    Renew(SubscriptionCallback),
    UnknownCallback { callback_type: String },
    Order {
        order_id: Option<String>,
        status: Option<String>,
        plan_id: Option<i64>,
    },
}

impl SolidgateEvent {
    /// Parse a raw delivery body. Empty, non-JSON and non-object bodies are
    /// rejected, as are lifecycle callbacks missing the email or product id.
    /// A `callback_type` that is not a known string is an unknown callback.
    pub fn parse(body: &[u8]) -> BillingResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(BillingError::InvalidPayload("Empty payload".to_string()));
        }

        let value: Value = serde_json::from_slice(body)
            .map_err(|e| BillingError::InvalidPayload(format!("Invalid JSON payload: {}", e)))?;
        let Value::Object(data) = value else {
            return Err(BillingError::InvalidPayload("Invalid JSON payload".to_string()));
        };

        match data.get("callback_type") {
            Some(callback_type) => Self::parse_callback(callback_type, &data),
            None => Ok(Self::parse_order(&data)),
        }
    }

    fn parse_callback(callback_type: &Value, data: &Map<String, Value>) -> BillingResult<Self> {
        let Some(callback_type) = callback_type.as_str() else {
            return Ok(SolidgateEvent::UnknownCallback {
                callback_type: callback_type.to_string(),
            });
        };

        let kind = CallbackType::parse(callback_type);
        if let CallbackType::Other(callback_type) = kind {
            return Ok(SolidgateEvent::UnknownCallback { callback_type });
        }

        let customer_email = nested_str(data, "customer", "customer_email");
        let product_id = nested_str(data, "product", "product_id");
        let (Some(customer_email), Some(product_id)) = (customer_email, product_id) else {
            return Err(BillingError::InvalidPayload(
                "Missing email or product_id in webhook data".to_string(),
            ));
        };

        let callback = SubscriptionCallback {
            customer_email: customer_email.to_string(),
            product_id: product_id.to_string(),
        };

        Ok(match kind {
            CallbackType::Active => SolidgateEvent::Active(callback),
            _ => SolidgateEvent::Renew(callback),
        })
    }

    fn parse_order(data: &Map<String, Value>) -> Self {
        SolidgateEvent::Order {
            order_id: nested_str(data, "order", "order_id").map(str::to_string),
            status: nested_str(data, "order", "status").map(str::to_string),
            plan_id: data
                .get("order_metadata")
                .and_then(|m| m.get("plan_id"))
                .and_then(Value::as_i64),
        }
    }
}

fn nested_str<'a>(data: &'a Map<String, Value>, outer: &str, field: &str) -> Option<&'a str> {
    data.get(outer)
        .and_then(|o| o.get(field))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

#[derive(Clone)]
pub struct SolidgateWebhookHandler {
    solidgate: SolidgateClient,
    reconciler: Reconciler,
}

impl SolidgateWebhookHandler {
    pub fn new(solidgate: SolidgateClient, reconciler: Reconciler) -> Self {
        Self {
            solidgate,
            reconciler,
        }
    }

    /// Check the delivery signature (when keys are configured) and parse it
    pub fn verify_event(
        &self,
        body: &[u8],
        merchant: Option<&str>,
        signature: Option<&str>,
    ) -> BillingResult<SolidgateEvent> {
        if !self.solidgate.verify_webhook(body, merchant, signature)? {
            tracing::warn!("Solidgate webhook keys not configured - skipping signature verification");
        }

        SolidgateEvent::parse(body)
    }

    pub async fn handle_event(&self, event: SolidgateEvent) -> BillingResult<WebhookOutcome> {
        self.handle_event_at(event, OffsetDateTime::now_utc()).await
    }

    pub async fn handle_event_at(
        &self,
        event: SolidgateEvent,
        now: OffsetDateTime,
    ) -> BillingResult<WebhookOutcome> {
        match event {
            SolidgateEvent::Active(callback) => self.reconcile_callback("active", callback, now).await,
            // Renewal does not require a prior "active" callback
            SolidgateEvent::Renew(callback) => self.reconcile_callback("renew", callback, now).await,
            SolidgateEvent::UnknownCallback { callback_type } => {
                tracing::warn!(callback_type = %callback_type, "Unknown Solidgate callback_type");
                Ok(WebhookOutcome::Ignored {
                    reason: format!("unknown callback_type {}", callback_type),
                })
            }
            SolidgateEvent::Order {
                order_id,
                status,
                plan_id,
            } => {
                let approved = status
                    .as_deref()
                    .is_some_and(|s| APPROVED_ORDER_STATUSES.contains(&s));

                if plan_id == Some(ONE_TIME_PAYMENT_PLAN_ID) && approved {
                    tracing::info!(
                        order_id = ?order_id,
                        status = ?status,
                        "One-time payment event received"
                    );
                    return Ok(WebhookOutcome::OneTimePayment { order_id });
                }

                tracing::debug!(
                    order_id = ?order_id,
                    status = ?status,
                    plan_id = ?plan_id,
                    "Solidgate order event ignored"
                );
                Ok(WebhookOutcome::Ignored {
                    reason: "order event without action".to_string(),
                })
            }
        }
    }

    async fn reconcile_callback(
        &self,
        callback_type: &str,
        callback: SubscriptionCallback,
        now: OffsetDateTime,
    ) -> BillingResult<WebhookOutcome> {
        let Some(user) = self
            .reconciler
            .find_user_for_reconciliation(LookupKey::Email(&callback.customer_email))
            .await?
        else {
            return Ok(WebhookOutcome::Reconciled(ReconcileOutcome::UserNotFound));
        };

        let outcome = self
            .reconciler
            .reconcile_user(&user, Gateway::Solidgate, &callback.product_id, now)
            .await?;

        tracing::info!(
            callback_type = %callback_type,
            product_id = %callback.product_id,
            user_id = %user.id,
            outcome = ?outcome,
            "Processed Solidgate subscription callback"
        );

        Ok(WebhookOutcome::Reconciled(outcome))
    }
}
