//! Gateway customer management

use std::sync::Arc;

use transactiq_shared::{Gateway, User, UserStore};
use uuid::Uuid;

use crate::client::StripeGateway;
use crate::error::{BillingError, BillingResult};

/// Ensures every user has at most one customer per gateway
#[derive(Clone)]
pub struct CustomerService {
    stripe: Arc<dyn StripeGateway>,
    store: Arc<dyn UserStore>,
}

impl CustomerService {
    pub fn new(stripe: Arc<dyn StripeGateway>, store: Arc<dyn UserStore>) -> Self {
        Self { stripe, store }
    }

    /// Return the stored customer id for `gateway`, creating and persisting
    /// one if the user has none yet.
    ///
    /// Stripe customers are created through the API. Solidgate identifies
    /// customers by the merchant's own account id, so one is minted locally.
    pub async fn get_or_create_gateway_customer(
        &self,
        gateway: Gateway,
        user: &User,
    ) -> BillingResult<String> {
        // Re-read so a stale caller copy cannot cause a second customer
        let current = self
            .store
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("User {}", user.id)))?;

        if let Some(existing) = current.customer_id(gateway) {
            tracing::debug!(
                user_id = %user.id,
                gateway = %gateway,
                customer_id = %existing,
                "Reusing existing gateway customer"
            );
            return Ok(existing.to_string());
        }

        let customer_id = match gateway {
            Gateway::Stripe => {
                self.stripe
                    .create_customer(&current.email, &current.name, current.id)
                    .await?
            }
            Gateway::Solidgate => Uuid::new_v4().to_string(),
        };

        let stored = self
            .store
            .set_customer_id_if_absent(current.id, gateway, &customer_id)
            .await?;

        if stored == 0 {
            // Lost a race with a concurrent checkout for the same user
            let winner = self
                .store
                .find_by_id(current.id)
                .await?
                .and_then(|u| u.customer_id(gateway).map(str::to_string))
                .ok_or_else(|| BillingError::NotFound(format!("User {}", current.id)))?;

            tracing::warn!(
                user_id = %current.id,
                gateway = %gateway,
                orphaned_customer_id = %customer_id,
                customer_id = %winner,
                "Concurrent customer creation, keeping the stored customer"
            );
            return Ok(winner);
        }

        tracing::info!(
            user_id = %current.id,
            gateway = %gateway,
            customer_id = %customer_id,
            "Created new gateway customer"
        );

        Ok(customer_id)
    }
}
