//! User lookup and plan state update
//!
//! Both gateways funnel into the same two steps: find the user the event is
//! about, then overwrite their plan fields in one write. A miss at either
//! step is reported as an outcome, not an error, so webhook handlers can
//! acknowledge the delivery and stop the gateway from retrying forever.

use std::sync::Arc;

use time::OffsetDateTime;
use transactiq_shared::{Gateway, PlanUpdate, User, UserStore};
use uuid::Uuid;

use crate::error::BillingResult;
use crate::plans::PlanCatalog;

/// Key a webhook event identifies its user by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey<'a> {
    /// Customer id stored on the user during Stripe checkout
    StripeCustomer(&'a str),
    /// Email embedded in a Solidgate callback
    Email(&'a str),
}

/// What reconciliation did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        user_id: Uuid,
        plan_id: i32,
        expires_at: OffsetDateTime,
    },
    UnknownProduct {
        product_id: String,
    },
    UserNotFound,
    /// The user vanished between lookup and write
    NotUpdated {
        user_id: Uuid,
    },
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn UserStore>,
    catalog: PlanCatalog,
}

impl Reconciler {
    pub fn new(store: Arc<dyn UserStore>, catalog: PlanCatalog) -> Self {
        Self { store, catalog }
    }

    /// Never creates a user; a miss is logged and returned as `None`
    pub async fn find_user_for_reconciliation(
        &self,
        key: LookupKey<'_>,
    ) -> BillingResult<Option<User>> {
        let user = match key {
            LookupKey::StripeCustomer(customer_id) => {
                self.store
                    .find_by_customer_id(Gateway::Stripe, customer_id)
                    .await?
            }
            LookupKey::Email(email) => self.store.find_by_email(email).await?,
        };

        if user.is_none() {
            match key {
                LookupKey::StripeCustomer(customer_id) => tracing::warn!(
                    customer_id = %customer_id,
                    "No user found for Stripe customer"
                ),
                LookupKey::Email(email) => tracing::warn!(
                    email = %redact_email(email),
                    "No user found for email"
                ),
            }
        }

        Ok(user)
    }

    /// Overwrite the plan fields. Returns `false` (and logs) when zero
    /// records were affected.
    pub async fn apply_plan_update(&self, user_id: Uuid, update: &PlanUpdate) -> BillingResult<bool> {
        let affected = self.store.apply_plan_update(user_id, update).await?;

        if affected == 0 {
            tracing::warn!(
                user_id = %user_id,
                plan_id = update.plan_id,
                processor = %update.processor,
                "Plan update affected no records"
            );
            return Ok(false);
        }

        tracing::info!(
            user_id = %user_id,
            plan_id = update.plan_id,
            expires_at = %update.expires_at,
            processor = %update.processor,
            "Updated user with new plan details"
        );
        Ok(true)
    }

    /// Resolve `product_id` for `gateway` and write the result onto `user`
    pub async fn reconcile_user(
        &self,
        user: &User,
        gateway: Gateway,
        product_id: &str,
        now: OffsetDateTime,
    ) -> BillingResult<ReconcileOutcome> {
        let Some(resolved) = self.catalog.resolve_plan(gateway, product_id, now) else {
            tracing::warn!(
                gateway = %gateway,
                product_id = %product_id,
                user_id = %user.id,
                "Unknown product id, discarding event"
            );
            return Ok(ReconcileOutcome::UnknownProduct {
                product_id: product_id.to_string(),
            });
        };

        let update = PlanUpdate {
            plan_id: resolved.plan_id,
            expires_at: resolved.expires_at,
            processor: gateway,
        };

        if !self.apply_plan_update(user.id, &update).await? {
            return Ok(ReconcileOutcome::NotUpdated { user_id: user.id });
        }

        Ok(ReconcileOutcome::Applied {
            user_id: user.id,
            plan_id: resolved.plan_id,
            expires_at: resolved.expires_at,
        })
    }
}

/// Keep the first character of the local part and the domain
fn redact_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}
