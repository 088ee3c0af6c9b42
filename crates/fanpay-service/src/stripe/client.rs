//! Stripe API client implementation.

use reqwest::Client;
use std::time::Duration;

use super::types::{PaymentIntent, StripeErrorResponse};
use crate::crypto::SignatureHeader;

/// How far a webhook timestamp may drift from our clock.
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Invalid webhook signature.
    #[error("Invalid webhook signature")]
    InvalidSignature,
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    /// * `base_url` - API root, `https://api.stripe.com` outside tests
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, StripeError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Create a `PaymentIntent` for `amount_cents`, tagged with `metadata`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or Stripe rejects it.
    pub async fn create_payment_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: &[(&str, String)],
    ) -> Result<PaymentIntent, StripeError> {
        let mut params = vec![
            ("amount".to_string(), amount_cents.to_string()),
            ("currency".to_string(), currency.to_string()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        params.extend(
            metadata
                .iter()
                .map(|(key, value)| (format!("metadata[{key}]"), value.clone())),
        );

        tracing::debug!(amount_cents = %amount_cents, "Creating Stripe payment intent");

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a single payment intent by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the intent does not exist.
    pub async fn get_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent, StripeError> {
        let response = self
            .client
            .get(format!(
                "{}/v1/payment_intents/{}",
                self.base_url, payment_intent_id
            ))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(StripeError::Api {
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

/// Verify a `Stripe-Signature` header against the raw request body.
///
/// # Errors
///
/// `StripeError::InvalidSignature` if the header is malformed, stale, or no
/// `v1` signature matches.
pub fn verify_webhook_signature(
    payload: &str,
    signature: &str,
    secret: &str,
) -> Result<(), StripeError> {
    let header = SignatureHeader::parse(signature).ok_or(StripeError::InvalidSignature)?;
    let now = chrono::Utc::now().timestamp();

    if header.verify(payload, secret, now, WEBHOOK_TOLERANCE_SECS) {
        Ok(())
    } else {
        Err(StripeError::InvalidSignature)
    }
}
