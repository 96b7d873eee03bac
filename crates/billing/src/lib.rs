// Billing crate clippy configuration
#![allow(clippy::result_large_err)] // BillingError carries gateway error text
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! TransactIQ Billing Module
//!
//! Keeps each user's plan state in step with what they paid for on Stripe or
//! Solidgate.
//!
//! ## Features
//!
//! - **Checkout**: Stripe hosted checkout or signed Solidgate form data
//! - **Customers**: At most one gateway customer per user and gateway
//! - **Plan Resolution**: Price/product id to plan tier and expiration
//! - **Reconciliation**: Apply paid plans from verified webhook deliveries
//! - **Portal**: Stripe self-service billing portal

pub mod checkout;
pub mod client;
pub mod customer;
pub mod error;
pub mod plans;
pub mod portal;
pub mod reconcile;
pub mod solidgate;
pub mod solidgate_webhooks;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use transactiq_shared::UserStore;

// Checkout
pub use checkout::{CheckoutArtifact, CheckoutService};

// Client
pub use client::{CheckoutSessionParams, HostedSession, StripeClient, StripeConfig, StripeGateway};

// Customer
pub use customer::CustomerService;

// Error
pub use error::{BillingError, BillingResult};

// Plans
pub use plans::{add_calendar_months, PlanCatalog, PlanTier, PriceIds, ResolvedPlan};

// Portal
pub use portal::{PortalResponse, PortalService};

// Reconciliation
pub use reconcile::{LookupKey, ReconcileOutcome, Reconciler};

// Solidgate
pub use solidgate::{FormMerchantData, PaymentIntent, SolidgateClient, SolidgateConfig, WebhookKeys};
pub use solidgate_webhooks::{SolidgateEvent, SolidgateWebhookHandler, SubscriptionCallback};

// Webhooks
pub use webhooks::{StripeEvent, WebhookHandler, WebhookOutcome, SIGNATURE_TOLERANCE_SECS};

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub checkout: CheckoutService,
    pub customer: CustomerService,
    pub portal: PortalService,
    pub reconciler: Reconciler,
    pub webhooks: WebhookHandler,
    pub solidgate_webhooks: SolidgateWebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(store: Arc<dyn UserStore>, app_url: &str) -> BillingResult<Self> {
        let stripe = StripeClient::from_env()?;
        let solidgate = SolidgateClient::from_env()?;
        let catalog = PlanCatalog::new(
            stripe.config().price_ids.clone(),
            solidgate.config().price_ids.clone(),
        );
        let webhook_secret = stripe.config().webhook_secret.clone();

        Ok(Self::new(
            Arc::new(stripe),
            &webhook_secret,
            solidgate,
            catalog,
            store,
            app_url,
        ))
    }

    /// Create a new billing service with explicit collaborators
    pub fn new(
        stripe: Arc<dyn StripeGateway>,
        stripe_webhook_secret: &str,
        solidgate: SolidgateClient,
        catalog: PlanCatalog,
        store: Arc<dyn UserStore>,
        app_url: &str,
    ) -> Self {
        let customer = CustomerService::new(stripe.clone(), store.clone());
        let reconciler = Reconciler::new(store, catalog.clone());

        Self {
            checkout: CheckoutService::new(
                customer.clone(),
                stripe.clone(),
                solidgate.clone(),
                catalog,
                app_url,
            ),
            customer,
            portal: PortalService::new(stripe.clone(), app_url),
            reconciler: reconciler.clone(),
            webhooks: WebhookHandler::new(stripe, reconciler.clone(), stripe_webhook_secret),
            solidgate_webhooks: SolidgateWebhookHandler::new(solidgate, reconciler),
        }
    }
}
