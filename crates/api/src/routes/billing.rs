//! Billing self-service endpoints

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::Serialize;
use time::OffsetDateTime;
use transactiq_billing::{PlanTier, PortalResponse};

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct BillingStatusResponse {
    pub plan_id: i32,
    pub plan: Option<PlanTier>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub plan_expire_date: Option<OffsetDateTime>,
    pub payment_processor: Option<String>,
    pub active: bool,
}

/// POST /api/billing/portal
pub async fn create_portal_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<PortalResponse>> {
    let user = state
        .store
        .find_by_id(auth_user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let portal = state.billing.portal.create_portal_session(&user).await?;
    Ok(Json(portal))
}

/// GET /api/billing/status
pub async fn get_billing_status(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<BillingStatusResponse>> {
    let user = state
        .store
        .find_by_id(auth_user.user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(BillingStatusResponse {
        active: user.has_active_plan(OffsetDateTime::now_utc()),
        plan_id: user.plan_id,
        plan: PlanTier::from_plan_id(user.plan_id),
        plan_expire_date: user.plan_expire_date,
        payment_processor: user.payment_processor,
    }))
}
