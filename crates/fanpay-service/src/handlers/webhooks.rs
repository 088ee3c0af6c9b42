//! Stripe webhook: server-side settlement of paid unlocks.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use fanpay_core::UserId;

use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::{verify_webhook_signature, PaymentIntent, WebhookEvent};
use crate::unlock::{meta, settle_stripe_intent};

/// Header carrying the Stripe signature.
const SIGNATURE_HEADER: &str = "stripe-signature";

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
}

/// Handle Stripe webhooks.
///
/// Events are only accepted with a valid signature, so a missing webhook
/// secret rejects every delivery.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let Some(secret) = state.config.stripe_webhook_secret.as_deref() else {
        tracing::warn!("Stripe webhook received but STRIPE_WEBHOOK_SECRET is not configured");
        return Err(ApiError::InvalidInput("Webhook secret not configured".into()));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidInput("Missing Stripe signature".into()))?;

    verify_webhook_signature(&body, signature, secret).map_err(|e| {
        tracing::warn!(error = %e, "Invalid Stripe webhook signature");
        ApiError::from(e)
    })?;

    let event: WebhookEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received Stripe webhook"
    );

    match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            handle_payment_succeeded(&state, event.data.object).await?;
        }
        "payment_intent.payment_failed" => {
            let intent_id = event.data.object.get("id").and_then(|v| v.as_str());
            tracing::warn!(payment_intent_id = ?intent_id, "Stripe payment failed");
        }
        _ => {
            tracing::debug!(event_type = %event.event_type, "Unhandled Stripe event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

async fn handle_payment_succeeded(
    state: &AppState,
    object: serde_json::Value,
) -> Result<(), ApiError> {
    let intent: PaymentIntent =
        serde_json::from_value(object).map_err(|e| ApiError::InvalidInput(e.to_string()))?;

    let Some(user) = intent.meta(meta::USER_ID) else {
        tracing::info!(
            payment_intent_id = %intent.id,
            "Payment intent has no user metadata, skipping"
        );
        return Ok(());
    };
    let user_id: UserId = user
        .parse()
        .map_err(|_| ApiError::InvalidInput(format!("Invalid user_id: {user}")))?;

    let outcome = settle_stripe_intent(state, user_id, &intent, None).await?;

    tracing::info!(
        payment_intent_id = %intent.id,
        user_id = %user_id,
        already_unlocked = %outcome.already_unlocked,
        "Unlock settled from Stripe webhook"
    );

    Ok(())
}
