//! In-process Stripe stand-in for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use transactiq_shared::InMemoryUserStore;
use uuid::Uuid;

use crate::client::{CheckoutSessionParams, HostedSession, StripeGateway};
use crate::error::{BillingError, BillingResult};
use crate::plans::test_catalog;
use crate::solidgate::{test_client, WebhookKeys};
use crate::BillingService;

pub(crate) const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

#[derive(Default)]
pub(crate) struct FakeStripeGateway {
    customers_created: AtomicUsize,
    checkout_sessions: AtomicUsize,
    subscription_prices: Mutex<HashMap<String, String>>,
    fail_customer_create: bool,
}

impl FakeStripeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_customer_create: true,
            ..Self::default()
        }
    }

    pub fn with_subscription(self, subscription_id: &str, price_id: &str) -> Self {
        self.subscription_prices
            .lock()
            .unwrap()
            .insert(subscription_id.to_string(), price_id.to_string());
        self
    }

    pub fn customers_created(&self) -> usize {
        self.customers_created.load(Ordering::SeqCst)
    }

    pub fn checkout_sessions(&self) -> usize {
        self.checkout_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StripeGateway for FakeStripeGateway {
    async fn create_customer(
        &self,
        _email: &str,
        _name: &str,
        _user_id: Uuid,
    ) -> BillingResult<String> {
        if self.fail_customer_create {
            return Err(BillingError::StripeApi("connection refused".to_string()));
        }
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("cus_fake_{}", n))
    }

    async fn subscription_price_id(&self, subscription_id: &str) -> BillingResult<Option<String>> {
        Ok(self
            .subscription_prices
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned())
    }

    async fn create_checkout_session(
        &self,
        params: CheckoutSessionParams<'_>,
    ) -> BillingResult<HostedSession> {
        let n = self.checkout_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(HostedSession {
            session_id: format!("cs_fake_{}", n),
            url: format!("https://checkout.stripe.test/{}?price={}", params.customer_id, params.price_id),
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> BillingResult<String> {
        Ok(format!(
            "https://billing.stripe.test/{}?return={}",
            customer_id, return_url
        ))
    }
}

pub(crate) fn test_webhook_keys() -> WebhookKeys {
    WebhookKeys {
        public_key: "wh_pk_test".to_string(),
        secret_key: "wh_sk_test".to_string(),
    }
}

/// A full billing service over an in-memory store
pub(crate) fn test_service(
    stripe: Arc<FakeStripeGateway>,
    webhook_keys: Option<WebhookKeys>,
) -> (BillingService, InMemoryUserStore) {
    let store = InMemoryUserStore::new();
    let service = BillingService::new(
        stripe,
        TEST_WEBHOOK_SECRET,
        test_client(webhook_keys),
        test_catalog(),
        Arc::new(store.clone()),
        "https://app.transactiq.test/",
    );
    (service, store)
}

/// `stripe-signature` header for `payload` signed at `timestamp`
pub(crate) fn stripe_signature_header(payload: &str, timestamp: i64) -> String {
    let sig = crate::webhooks::compute_signature(TEST_WEBHOOK_SECRET, timestamp, payload).unwrap();
    format!("t={},v1={}", timestamp, sig)
}
