//! Application state

use std::sync::Arc;

use transactiq_billing::BillingService;
use transactiq_shared::UserStore;

use crate::{
    auth::{AuthState, JwtManager},
    config::Config,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn UserStore>,
    pub jwt_manager: JwtManager,
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn UserStore>, billing: BillingService) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        tracing::info!(
            expiry_hours = config.jwt_expiry_hours,
            "JWT validation initialized"
        );

        tracing::info!(app_url = %config.app_url, "Billing service initialized");

        Self {
            config,
            store,
            jwt_manager,
            billing: Arc::new(billing),
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            store: self.store.clone(),
        }
    }
}
