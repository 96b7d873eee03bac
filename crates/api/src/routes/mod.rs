//! API routes

mod billing;
mod checkout;
mod webhooks;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::{auth::require_auth, state::AppState};

pub use billing::BillingStatusResponse;
pub use checkout::CheckoutRequest;

pub fn create_router(state: AppState) -> Router {
    // Webhooks authenticate by gateway signature, not by user token
    let webhook_routes = Router::new()
        .route("/api/webhooks/stripe", post(webhooks::stripe_webhook))
        .route("/api/webhooks/solidgate", post(webhooks::solidgate_webhook));

    let protected_routes = Router::new()
        .route("/api/checkout", post(checkout::create_checkout))
        .route("/api/billing/portal", post(billing::create_portal_session))
        .route("/api/billing/status", get(billing::get_billing_status))
        .route_layer(middleware::from_fn_with_state(
            state.auth_state(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(webhook_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
