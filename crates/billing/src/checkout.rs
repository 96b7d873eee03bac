//! Checkout/session initiation
//!
//! Runs ahead of any payment: makes sure the user has a customer on the
//! chosen gateway and returns whatever the browser needs to continue.
//! Stripe hands back a hosted-checkout redirect, Solidgate signed merchant
//! data for its embedded form.

use std::sync::Arc;

use serde::Serialize;
use transactiq_shared::{Gateway, User};
use uuid::Uuid;

use crate::client::{CheckoutSessionParams, StripeGateway};
use crate::customer::CustomerService;
use crate::error::BillingResult;
use crate::plans::{PlanCatalog, PlanTier};
use crate::solidgate::{FormMerchantData, PaymentIntent, SolidgateClient};

/// Gateway-specific continuation of a checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutArtifact {
    Redirect { url: String, session_id: String },
    FormMerchantData(FormMerchantData),
}

#[derive(Clone)]
pub struct CheckoutService {
    customers: CustomerService,
    stripe: Arc<dyn StripeGateway>,
    solidgate: SolidgateClient,
    catalog: PlanCatalog,
    app_url: String,
}

impl CheckoutService {
    pub fn new(
        customers: CustomerService,
        stripe: Arc<dyn StripeGateway>,
        solidgate: SolidgateClient,
        catalog: PlanCatalog,
        app_url: &str,
    ) -> Self {
        Self {
            customers,
            stripe,
            solidgate,
            catalog,
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn create_checkout_artifact(
        &self,
        gateway: Gateway,
        user: &User,
        tier: PlanTier,
    ) -> BillingResult<CheckoutArtifact> {
        let customer_id = self
            .customers
            .get_or_create_gateway_customer(gateway, user)
            .await?;
        let price_id = self.catalog.prices(gateway).price_id_for_tier(tier);

        let artifact = match gateway {
            Gateway::Stripe => {
                let success_url = format!(
                    "{}/dashboard/billing?session_id={{CHECKOUT_SESSION_ID}}",
                    self.app_url
                );
                let cancel_url = format!("{}/dashboard/subscription", self.app_url);

                let session = self
                    .stripe
                    .create_checkout_session(CheckoutSessionParams {
                        customer_id: &customer_id,
                        price_id,
                        user_id: user.id,
                        success_url: &success_url,
                        cancel_url: &cancel_url,
                    })
                    .await?;

                CheckoutArtifact::Redirect {
                    url: session.url,
                    session_id: session.session_id,
                }
            }
            Gateway::Solidgate => {
                let intent = PaymentIntent {
                    order_id: Uuid::new_v4().to_string(),
                    product_id: price_id.to_string(),
                    customer_account_id: customer_id.clone(),
                    customer_email: user.email.clone(),
                    order_description: format!("TransactIQ {} plan", tier),
                    platform: "WEB",
                    success_url: format!(
                        "{}/dashboard/billing?status=approved&plan_id={}",
                        self.app_url,
                        tier.plan_id()
                    ),
                    fail_url: format!("{}/dashboard/subscription", self.app_url),
                };

                CheckoutArtifact::FormMerchantData(self.solidgate.form_merchant_data(&intent)?)
            }
        };

        tracing::info!(
            user_id = %user.id,
            gateway = %gateway,
            plan = %tier,
            customer_id = %customer_id,
            "Checkout initiated"
        );

        Ok(artifact)
    }
}
