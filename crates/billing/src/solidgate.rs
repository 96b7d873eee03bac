//! Solidgate merchant client
//!
//! Solidgate's embedded payment form is initialised with merchant data the
//! server signs: an AES-256-CBC encrypted payment intent plus an
//! HMAC-SHA512 signature over it. The same signature scheme covers the
//! `signature` header on webhook deliveries.

use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::error::{BillingError, BillingResult};
use crate::plans::{required_env, PriceIds};

type HmacSha512 = Hmac<Sha512>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

const AES_KEY_LEN: usize = 32;

/// Merchant key pair used to sign webhook deliveries
#[derive(Clone)]
pub struct WebhookKeys {
    pub public_key: String,
    pub secret_key: String,
}

#[derive(Clone)]
pub struct SolidgateConfig {
    pub public_key: String,
    pub secret_key: String,
    pub price_ids: PriceIds,
    /// Webhook verification is skipped when unset
    pub webhook_keys: Option<WebhookKeys>,
}

impl std::fmt::Debug for SolidgateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolidgateConfig")
            .field("public_key", &self.public_key)
            .field("secret_key", &"[redacted]")
            .field("price_ids", &self.price_ids)
            .field("webhook_keys", &self.webhook_keys.is_some())
            .finish()
    }
}

impl SolidgateConfig {
    pub fn from_env() -> BillingResult<Self> {
        let webhook_keys = match (
            std::env::var("SOLIDGATE_WEBHOOK_PUBLIC_KEY").ok(),
            std::env::var("SOLIDGATE_WEBHOOK_SECRET_KEY").ok(),
        ) {
            (Some(public_key), Some(secret_key))
                if !public_key.is_empty() && !secret_key.is_empty() =>
            {
                Some(WebhookKeys {
                    public_key,
                    secret_key,
                })
            }
            _ => None,
        };

        Ok(Self {
            public_key: required_env("SOLIDGATE_PUBLIC_KEY")?,
            secret_key: required_env("SOLIDGATE_SECRET_KEY")?,
            price_ids: PriceIds::from_env("SOLIDGATE")?,
            webhook_keys,
        })
    }
}

/// Payment intent for the embedded form, before encryption
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub order_id: String,
    pub product_id: String,
    pub customer_account_id: String,
    pub customer_email: String,
    pub order_description: String,
    pub platform: &'static str,
    pub success_url: String,
    pub fail_url: String,
}

/// Signed data the browser hands to the Solidgate form SDK
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormMerchantData {
    pub merchant: String,
    pub signature: String,
    pub payment_intent: String,
}

#[derive(Clone)]
pub struct SolidgateClient {
    config: SolidgateConfig,
}

impl SolidgateClient {
    pub fn new(config: SolidgateConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(SolidgateConfig::from_env()?))
    }

    pub fn config(&self) -> &SolidgateConfig {
        &self.config
    }

    /// Encrypt and sign a payment intent
    pub fn form_merchant_data(&self, intent: &PaymentIntent) -> BillingResult<FormMerchantData> {
        let payload = serde_json::to_vec(intent)
            .map_err(|e| BillingError::Internal(format!("Failed to encode payment intent: {}", e)))?;

        let payment_intent = self.encrypt(&payload)?;
        let signature = sign(
            &self.config.public_key,
            &self.config.secret_key,
            payment_intent.as_bytes(),
        )?;

        Ok(FormMerchantData {
            merchant: self.config.public_key.clone(),
            signature,
            payment_intent,
        })
    }

    /// Verify the `merchant`/`signature` headers of a webhook delivery.
    ///
    /// Returns `Ok(false)` when no webhook keys are configured and the body
    /// was not checked.
    pub fn verify_webhook(
        &self,
        body: &[u8],
        merchant: Option<&str>,
        signature: Option<&str>,
    ) -> BillingResult<bool> {
        let Some(keys) = &self.config.webhook_keys else {
            return Ok(false);
        };

        let (Some(merchant), Some(signature)) = (merchant, signature) else {
            return Err(BillingError::WebhookSignatureMissing);
        };

        if merchant != keys.public_key {
            tracing::warn!(merchant = %merchant, "Solidgate webhook from unexpected merchant");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let expected = sign(&keys.public_key, &keys.secret_key, body)?;
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return Err(BillingError::WebhookSignatureInvalid);
        }

        Ok(true)
    }

    /// AES-256-CBC keyed by the first 32 bytes of the secret, IV prepended
    fn encrypt(&self, plaintext: &[u8]) -> BillingResult<String> {
        let key = self
            .config
            .secret_key
            .as_bytes()
            .get(..AES_KEY_LEN)
            .ok_or_else(|| {
                BillingError::Config("SOLIDGATE_SECRET_KEY must be at least 32 bytes".to_string())
            })?;
        let iv: [u8; 16] = rand::random();

        let cipher = Aes256CbcEnc::new_from_slices(key, &iv)
            .map_err(|e| BillingError::SolidgateApi(format!("Invalid cipher parameters: {}", e)))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut out = Vec::with_capacity(iv.len() + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        Ok(URL_SAFE.encode(out))
    }
}

/// `base64(hex(HMAC-SHA512(secret, public + data + public)))`
fn sign(public_key: &str, secret_key: &str, data: &[u8]) -> BillingResult<String> {
    let mut mac = HmacSha512::new_from_slice(secret_key.as_bytes())
        .map_err(|_| BillingError::Config("Invalid Solidgate secret key".to_string()))?;
    mac.update(public_key.as_bytes());
    mac.update(data);
    mac.update(public_key.as_bytes());

    let digest = hex::encode(mac.finalize().into_bytes());
    Ok(STANDARD.encode(digest))
}

#[cfg(test)]
pub(crate) fn test_client(webhook_keys: Option<WebhookKeys>) -> SolidgateClient {
    SolidgateClient::new(SolidgateConfig {
        public_key: "api_pk_test".to_string(),
        secret_key: "api_sk_0123456789abcdef0123456789abcdef".to_string(),
        price_ids: crate::plans::test_catalog()
            .prices(transactiq_shared::Gateway::Solidgate)
            .clone(),
        webhook_keys,
    })
}

#[cfg(test)]
pub(crate) fn test_webhook_signature(keys: &WebhookKeys, body: &[u8]) -> String {
    sign(&keys.public_key, &keys.secret_key, body).unwrap()
}

/// Decrypt form merchant data back into the payment intent JSON
#[cfg(test)]
pub(crate) fn decrypt_payment_intent(
    client: &SolidgateClient,
    payment_intent: &str,
) -> serde_json::Value {
    use aes::cipher::BlockDecryptMut;

    let raw = URL_SAFE.decode(payment_intent).unwrap();
    let (iv, ciphertext) = raw.split_at(16);
    let key = &client.config().secret_key.as_bytes()[..AES_KEY_LEN];
    let plaintext = cbc::Decryptor::<aes::Aes256>::new_from_slices(key, iv)
        .unwrap()
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .unwrap();
    serde_json::from_slice(&plaintext).unwrap()
}
