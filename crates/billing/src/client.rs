//! Stripe client wrapper
//!
//! `StripeGateway` is the narrow set of Stripe calls the billing flows make.
//! `StripeClient` implements it over async-stripe; tests use a fake.

use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionMode, CreateBillingPortalSession,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCustomer, Customer, CustomerId,
    Subscription, SubscriptionId,
};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::plans::{required_env, PriceIds};

/// Stripe credentials and price configuration
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_ids: PriceIds,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[redacted]")
            .field("webhook_secret", &"[redacted]")
            .field("price_ids", &self.price_ids)
            .finish()
    }
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: required_env("STRIPE_SECRET_KEY")?,
            webhook_secret: required_env("STRIPE_WEBHOOK_SECRET")?,
            price_ids: PriceIds::from_env("STRIPE")?,
        })
    }
}

/// Parameters for a hosted subscription checkout
#[derive(Debug, Clone)]
pub struct CheckoutSessionParams<'a> {
    pub customer_id: &'a str,
    pub price_id: &'a str,
    pub user_id: Uuid,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

/// A created hosted checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedSession {
    pub session_id: String,
    pub url: String,
}

#[async_trait]
pub trait StripeGateway: Send + Sync {
    /// Create a customer and return its id
    async fn create_customer(&self, email: &str, name: &str, user_id: Uuid)
        -> BillingResult<String>;

    /// Price id billed by the first item of a subscription
    async fn subscription_price_id(&self, subscription_id: &str) -> BillingResult<Option<String>>;

    async fn create_checkout_session(
        &self,
        params: CheckoutSessionParams<'_>,
    ) -> BillingResult<HostedSession>;

    /// Billing portal URL for an existing customer
    async fn create_portal_session(&self, customer_id: &str, return_url: &str)
        -> BillingResult<String>;
}

/// async-stripe backed client
#[derive(Clone)]
pub struct StripeClient {
    inner: stripe::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            inner: stripe::Client::new(config.secret_key.clone()),
            config,
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.inner
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[async_trait]
impl StripeGateway for StripeClient {
    async fn create_customer(
        &self,
        email: &str,
        name: &str,
        user_id: Uuid,
    ) -> BillingResult<String> {
        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());

        let params = CreateCustomer {
            email: Some(email),
            name: if name.is_empty() { None } else { Some(name) },
            metadata: Some(metadata),
            ..Default::default()
        };

        let customer = Customer::create(self.inner(), params).await?;
        Ok(customer.id.to_string())
    }

    async fn subscription_price_id(&self, subscription_id: &str) -> BillingResult<Option<String>> {
        let sub_id = subscription_id
            .parse::<SubscriptionId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid subscription ID: {}", e)))?;

        let subscription = Subscription::retrieve(self.inner(), &sub_id, &[]).await?;

        // Legacy plans expose the same id through `plan`
        let price_id = subscription.items.data.first().and_then(|item| {
            item.price
                .as_ref()
                .map(|p| p.id.to_string())
                .or_else(|| item.plan.as_ref().map(|p| p.id.to_string()))
        });

        Ok(price_id)
    }

    async fn create_checkout_session(
        &self,
        params: CheckoutSessionParams<'_>,
    ) -> BillingResult<HostedSession> {
        let customer_id = params
            .customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let user_id = params.user_id.to_string();
        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), user_id.clone());

        let mut create_session = CreateCheckoutSession::new();
        create_session.customer = Some(customer_id);
        create_session.mode = Some(CheckoutSessionMode::Subscription);
        create_session.success_url = Some(params.success_url);
        create_session.cancel_url = Some(params.cancel_url);
        create_session.client_reference_id = Some(&user_id);
        create_session.metadata = Some(metadata);
        create_session.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(params.price_id.to_string()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = CheckoutSession::create(self.inner(), create_session).await?;
        let url = session.url.ok_or_else(|| {
            BillingError::StripeApi("Checkout session returned without a URL".to_string())
        })?;

        Ok(HostedSession {
            session_id: session.id.to_string(),
            url,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> BillingResult<String> {
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let mut create_session = CreateBillingPortalSession::new(customer_id);
        create_session.return_url = Some(return_url);

        let session = BillingPortalSession::create(self.inner(), create_session).await?;
        Ok(session.url)
    }
}
