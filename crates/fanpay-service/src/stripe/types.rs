//! Stripe API types.

use std::collections::HashMap;

use serde::Deserialize;

/// Status Stripe reports for a fully paid intent.
pub const PAYMENT_INTENT_SUCCEEDED: &str = "succeeded";

/// Stripe `PaymentIntent` object.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    /// Payment intent ID.
    pub id: String,
    /// Amount in cents.
    #[serde(default)]
    pub amount: i64,
    /// Amount actually received, in cents.
    #[serde(default)]
    pub amount_received: Option<i64>,
    /// Currency (e.g., "usd").
    #[serde(default)]
    pub currency: String,
    /// Status (succeeded, processing, `requires_payment_method`, ...).
    #[serde(default)]
    pub status: String,
    /// Secret handed to the browser to confirm the payment.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Metadata attached at creation.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PaymentIntent {
    /// Whether Stripe reports the intent as paid.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.status == PAYMENT_INTENT_SUCCEEDED
    }

    /// Amount paid, preferring `amount_received` when Stripe reports it.
    #[must_use]
    pub fn paid_cents(&self) -> i64 {
        self.amount_received.unwrap_or(self.amount)
    }

    /// Metadata value by key.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Stripe webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "`payment_intent.succeeded`").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The event object.
    pub object: serde_json::Value,
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}
