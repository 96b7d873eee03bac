//! Plan resolution
//!
//! Maps a gateway's price/product identifier onto one of the three paid
//! tiers and computes the absolute expiration from "now".
//!
//! Expirations use calendar arithmetic: adding months keeps the day of the
//! month and clamps it to the last day when the target month is shorter,
//! so Jan 31 + 1 month is Feb 28 (Feb 29 in leap years) and
//! Feb 29 + 1 year is Feb 28. Time of day and offset are preserved.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime};
use transactiq_shared::Gateway;

use crate::error::{BillingError, BillingResult};

/// A paid entitlement level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Monthly,
    Quarterly,
    Annual,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Monthly, PlanTier::Quarterly, PlanTier::Annual];

    pub fn plan_id(self) -> i32 {
        match self {
            PlanTier::Monthly => 1,
            PlanTier::Quarterly => 2,
            PlanTier::Annual => 3,
        }
    }

    pub fn from_plan_id(plan_id: i32) -> Option<Self> {
        match plan_id {
            1 => Some(PlanTier::Monthly),
            2 => Some(PlanTier::Quarterly),
            3 => Some(PlanTier::Annual),
            _ => None,
        }
    }

    /// Length of one billing period in calendar months
    pub fn months(self) -> u32 {
        match self {
            PlanTier::Monthly => 1,
            PlanTier::Quarterly => 3,
            PlanTier::Annual => 12,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Monthly => "monthly",
            PlanTier::Quarterly => "quarterly",
            PlanTier::Annual => "annual",
        }
    }

    /// Expiration of a period starting at `now`
    pub fn expires_at(self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        add_calendar_months(now, self.months())
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(PlanTier::Monthly),
            "quarterly" => Ok(PlanTier::Quarterly),
            "annual" | "annually" => Ok(PlanTier::Annual),
            other => Err(BillingError::InvalidPayload(format!(
                "Unknown plan: {}",
                other
            ))),
        }
    }
}

/// Add calendar months, clamping the day to the end of the target month.
/// Returns `None` only when the result falls outside the supported year range.
pub fn add_calendar_months(dt: OffsetDateTime, months: u32) -> Option<OffsetDateTime> {
    let date = dt.date();
    let start = NaiveDate::from_ymd_opt(
        date.year(),
        u32::from(u8::from(date.month())),
        u32::from(date.day()),
    )?;
    let end = start.checked_add_months(Months::new(months))?;

    let month = Month::try_from(u8::try_from(end.month()).ok()?).ok()?;
    let day = u8::try_from(end.day()).ok()?;
    let target = Date::from_calendar_date(end.year(), month, day).ok()?;
    Some(dt.replace_date(target))
}

/// The three price/product identifiers one gateway uses for the tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceIds {
    pub monthly: String,
    pub quarterly: String,
    pub annual: String,
}

impl PriceIds {
    /// Read `{PREFIX}_PRICE_1_ID`, `{PREFIX}_PRICE_3_ID` and `{PREFIX}_PRICE_12_ID`
    pub fn from_env(prefix: &str) -> BillingResult<Self> {
        Ok(Self {
            monthly: required_env(&format!("{}_PRICE_1_ID", prefix))?,
            quarterly: required_env(&format!("{}_PRICE_3_ID", prefix))?,
            annual: required_env(&format!("{}_PRICE_12_ID", prefix))?,
        })
    }

    pub fn price_id_for_tier(&self, tier: PlanTier) -> &str {
        match tier {
            PlanTier::Monthly => &self.monthly,
            PlanTier::Quarterly => &self.quarterly,
            PlanTier::Annual => &self.annual,
        }
    }

    pub fn tier_for_price_id(&self, price_id: &str) -> Option<PlanTier> {
        PlanTier::ALL
            .into_iter()
            .find(|tier| self.price_id_for_tier(*tier) == price_id)
    }
}

pub(crate) fn required_env(key: &str) -> BillingResult<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| BillingError::Config(format!("{} not set", key)))
}

/// Target state computed from a recognized product id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPlan {
    pub tier: PlanTier,
    pub plan_id: i32,
    pub expires_at: OffsetDateTime,
}

/// Per-gateway tier mapping
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    stripe: PriceIds,
    solidgate: PriceIds,
}

impl PlanCatalog {
    pub fn new(stripe: PriceIds, solidgate: PriceIds) -> Self {
        Self { stripe, solidgate }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(
            PriceIds::from_env("STRIPE")?,
            PriceIds::from_env("SOLIDGATE")?,
        ))
    }

    pub fn prices(&self, gateway: Gateway) -> &PriceIds {
        match gateway {
            Gateway::Stripe => &self.stripe,
            Gateway::Solidgate => &self.solidgate,
        }
    }

    /// `None` means "unknown product": callers log and discard the event
    pub fn resolve_plan(
        &self,
        gateway: Gateway,
        product_id: &str,
        now: OffsetDateTime,
    ) -> Option<ResolvedPlan> {
        let tier = self.prices(gateway).tier_for_price_id(product_id)?;

        let Some(expires_at) = tier.expires_at(now) else {
            tracing::error!(
                gateway = %gateway,
                product_id = %product_id,
                now = %now,
                "Plan expiration out of range"
            );
            return None;
        };

        Some(ResolvedPlan {
            tier,
            plan_id: tier.plan_id(),
            expires_at,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_catalog() -> PlanCatalog {
    PlanCatalog::new(
        PriceIds {
            monthly: "price_month".to_string(),
            quarterly: "price_quarter".to_string(),
            annual: "price_year".to_string(),
        },
        PriceIds {
            monthly: "sg_month".to_string(),
            quarterly: "sg_quarter".to_string(),
            annual: "sg_year".to_string(),
        },
    )
}
