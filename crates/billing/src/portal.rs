//! Stripe billing portal

use std::sync::Arc;

use serde::Serialize;
use transactiq_shared::User;

use crate::client::StripeGateway;
use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

#[derive(Clone)]
pub struct PortalService {
    stripe: Arc<dyn StripeGateway>,
    app_url: String,
}

impl PortalService {
    pub fn new(stripe: Arc<dyn StripeGateway>, app_url: &str) -> Self {
        Self {
            stripe,
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    /// Self-service portal for a user who has checked out through Stripe
    pub async fn create_portal_session(&self, user: &User) -> BillingResult<PortalResponse> {
        let customer_id = user.stripe_customer_id.as_deref().ok_or_else(|| {
            BillingError::CustomerNotFound("Stripe".to_string())
        })?;

        let return_url = format!("{}/dashboard/billing", self.app_url);
        let url = self
            .stripe
            .create_portal_session(customer_id, &return_url)
            .await?;

        tracing::info!(user_id = %user.id, customer_id = %customer_id, "Created billing portal session");

        Ok(PortalResponse { url })
    }
}
