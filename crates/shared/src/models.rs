//! Subscriber record and billing state

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// `plan_id` of a user without a paid plan
pub const NO_PLAN: i32 = 0;

/// External payment processor that collects payment and emits webhooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    Stripe,
    Solidgate,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gateway::Stripe => "stripe",
            Gateway::Solidgate => "solidgate",
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gateway {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stripe" => Ok(Gateway::Stripe),
            "solidgate" => Ok(Gateway::Solidgate),
            other => Err(format!("Unknown payment gateway: {}", other)),
        }
    }
}

/// A subscriber record
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    /// Always stored lower-cased
    pub email: String,
    pub name: String,
    /// 0 = no plan, 1 = monthly, 2 = quarterly, 3 = annual
    pub plan_id: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub plan_expire_date: Option<OffsetDateTime>,
    /// Gateway that last wrote the plan fields
    pub payment_processor: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub solidgate_customer_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// A freshly signed-up user with no plan and no gateway customers
    pub fn new(email: &str, name: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            name: name.to_string(),
            plan_id: NO_PLAN,
            plan_expire_date: None,
            payment_processor: None,
            stripe_customer_id: None,
            solidgate_customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stored customer id for a gateway, if checkout has run for it
    pub fn customer_id(&self, gateway: Gateway) -> Option<&str> {
        match gateway {
            Gateway::Stripe => self.stripe_customer_id.as_deref(),
            Gateway::Solidgate => self.solidgate_customer_id.as_deref(),
        }
    }

    pub fn processor(&self) -> Option<Gateway> {
        self.payment_processor
            .as_deref()
            .and_then(|p| p.parse().ok())
    }

    /// `plan_id == 0` never grants entitlement, whatever the expiry says
    pub fn has_active_plan(&self, now: OffsetDateTime) -> bool {
        if self.plan_id == NO_PLAN {
            return false;
        }
        self.plan_expire_date.is_some_and(|expires| expires > now)
    }
}

/// Full replacement of a user's plan fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanUpdate {
    pub plan_id: i32,
    pub expires_at: OffsetDateTime,
    pub processor: Gateway,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
