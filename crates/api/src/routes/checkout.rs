//! Checkout initiation

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::Deserialize;
use transactiq_billing::{CheckoutArtifact, PlanTier};
use transactiq_shared::Gateway;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: String,
    pub gateway: String,
    /// Older clients send the plan twice
    #[serde(default)]
    pub billing_cycle: Option<String>,
}

impl CheckoutRequest {
    fn parse(&self) -> ApiResult<(Gateway, PlanTier)> {
        let gateway: Gateway = self.gateway.parse().map_err(ApiError::Validation)?;
        let tier: PlanTier = self.plan.parse().map_err(ApiError::from)?;

        if let Some(cycle) = &self.billing_cycle {
            let cycle: PlanTier = cycle.parse().map_err(ApiError::from)?;
            if cycle != tier {
                return Err(ApiError::Validation(format!(
                    "billing_cycle {} does not match plan {}",
                    cycle, tier
                )));
            }
        }

        Ok((gateway, tier))
    }
}

/// POST /api/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutArtifact>> {
    let (gateway, tier) = req.parse()?;

    let user = state
        .store
        .find_by_id(auth_user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let artifact = state
        .billing
        .checkout
        .create_checkout_artifact(gateway, &user, tier)
        .await?;

    Ok(Json(artifact))
}
