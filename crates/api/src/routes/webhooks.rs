//! Gateway webhook endpoints
//!
//! Verification failures and malformed bodies answer 400. Once an event is
//! verified it is acknowledged with 200 whether or not it changed anything;
//! only store failures answer 500 so the gateway retries.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /api/webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<(StatusCode, &'static str)> {
    let Some(signature) = header_str(&headers, "stripe-signature") else {
        tracing::warn!("Stripe webhook without stripe-signature header");
        return Err(ApiError::Validation("Missing stripe-signature header".to_string()));
    };

    let handler = &state.billing.webhooks;
    let event = handler.verify_event(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Rejected Stripe webhook");
        ApiError::from(e)
    })?;

    let outcome = handler.handle_event(event).await?;
    tracing::debug!(outcome = ?outcome, "Stripe webhook acknowledged");

    Ok((StatusCode::OK, "OK"))
}

/// POST /api/webhooks/solidgate
pub async fn solidgate_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let handler = &state.billing.solidgate_webhooks;
    let event = handler
        .verify_event(
            &body,
            header_str(&headers, "merchant"),
            header_str(&headers, "signature"),
        )
        .map_err(|e| {
            tracing::warn!(error = %e, "Rejected Solidgate webhook");
            ApiError::from(e)
        })?;

    let outcome = handler.handle_event(event).await?;
    tracing::debug!(outcome = ?outcome, "Solidgate webhook acknowledged");

    Ok(Json(json!({ "message": "OK" })))
}
