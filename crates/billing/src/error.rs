//! Billing error types

use thiserror::Error;
use transactiq_shared::StoreError;

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing webhook signature")]
    WebhookSignatureMissing,

    #[error("Invalid webhook signature")]
    WebhookSignatureInvalid,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Solidgate error: {0}")]
    SolidgateApi(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("No {0} customer ID found")]
    CustomerNotFound(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BillingError {
    /// Errors caused by the caller's input rather than by us or a gateway
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BillingError::WebhookSignatureMissing
                | BillingError::WebhookSignatureInvalid
                | BillingError::InvalidPayload(_)
        )
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}
