//! Stripe and `PayPal` checkout for priced resources.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use fanpay_core::{PricedResource, ResourceKind, ResourceRef, RoomId, UserId};
use fanpay_store::Store;

use crate::auth::{AdminAuth, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;
use crate::unlock::{
    confirm_bank_transfer, meta, parse_resource_id, reference_id, settle_paypal_order,
    settle_stripe_intent, UnlockResponse,
};

/// Checkout request for one resource.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Resource kind.
    pub resource_type: ResourceKind,
    /// Resource id.
    pub resource_id: String,
}

/// Load the resource a fan wants to buy, refusing purchases that grant nothing.
async fn purchasable(
    state: &AppState,
    user_id: UserId,
    body: &CheckoutRequest,
) -> Result<PricedResource, ApiError> {
    let target = ResourceRef::new(body.resource_type, parse_resource_id(&body.resource_id)?);
    let resource = state
        .store
        .get_resource(target)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} not found", target.kind)))?;

    if resource.creator_id == user_id {
        return Err(ApiError::InvalidInput(
            "Creators cannot buy their own content".into(),
        ));
    }
    if state.store.get_unlock(user_id, target).await?.is_some() {
        return Err(ApiError::InvalidInput("Already unlocked".into()));
    }
    Ok(resource)
}

// ============================================================================
// Stripe
// ============================================================================

/// Created intent.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentResponse {
    /// Secret the browser confirms the payment with.
    pub client_secret: String,
    /// Intent id, later sent to `/payments/stripe/confirm`.
    pub payment_intent_id: String,
}

/// Create a `PaymentIntent` for a resource.
pub async fn stripe_create_intent(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CreateIntentResponse>, ApiError> {
    let resource = purchasable(&state, auth.user_id, &body).await?;

    let mut metadata = vec![
        (meta::USER_ID, auth.user_id.to_string()),
        (meta::RESOURCE_TYPE, resource.resource.kind.as_str().to_string()),
        (meta::RESOURCE_ID, resource.resource.id.to_string()),
    ];
    if let Some(room) = resource.room_id {
        metadata.push((meta::ROOM_ID, room.to_string()));
    }

    let intent = state
        .stripe()?
        .create_payment_intent(resource.price_cents, &state.config.currency, &metadata)
        .await?;

    let client_secret = intent.client_secret.ok_or_else(|| {
        ApiError::ExternalService("Stripe returned no client secret".into())
    })?;

    tracing::info!(
        user_id = %auth.user_id,
        resource = %resource.resource,
        payment_intent_id = %intent.id,
        "Stripe payment intent created"
    );

    Ok(Json(CreateIntentResponse {
        client_secret,
        payment_intent_id: intent.id,
    }))
}

/// Confirm request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmIntentRequest {
    /// Intent to settle.
    pub payment_intent_id: String,
    /// Room the purchase was made from.
    pub room_id: RoomId,
}

/// Verify a paid intent and unlock its resource.
pub async fn stripe_confirm(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<ConfirmIntentRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    let intent = state
        .stripe()?
        .get_payment_intent(&body.payment_intent_id)
        .await?;

    let response = settle_stripe_intent(&state, auth.user_id, &intent, Some(body.room_id)).await?;
    Ok(Json(response))
}

// ============================================================================
// PayPal
// ============================================================================

/// Created order.
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    /// Order id the browser approves.
    #[serde(rename = "orderID")]
    pub order_id: String,
}

/// Create a `PayPal` order for a resource.
pub async fn paypal_create_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CreateOrderResponse>, ApiError> {
    let resource = purchasable(&state, auth.user_id, &body).await?;

    let order = state
        .paypal()?
        .create_order(
            resource.price_cents,
            &state.config.currency,
            &reference_id(resource.resource),
            &auth.user_id.to_string(),
        )
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        resource = %resource.resource,
        order_id = %order.id,
        "PayPal order created"
    );

    Ok(Json(CreateOrderResponse { order_id: order.id }))
}

/// Capture request.
#[derive(Debug, Deserialize)]
pub struct CaptureOrderRequest {
    /// Approved order.
    #[serde(rename = "orderID")]
    pub order_id: String,
}

/// Capture response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOrderResponse {
    /// Whether the resource is unlocked.
    pub success: bool,
    /// Order status reported by `PayPal`.
    pub status: String,
    /// Whether an earlier unlock already granted access.
    pub already_unlocked: bool,
}

/// Capture an approved order and unlock its resource.
///
/// An order captured by an earlier attempt is settled as-is.
pub async fn paypal_capture_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CaptureOrderRequest>,
) -> Result<Json<CaptureOrderResponse>, ApiError> {
    let paypal = state.paypal()?;

    let order = match paypal.capture_order(&body.order_id).await {
        Ok(_) => paypal.get_order(&body.order_id).await?,
        Err(capture_error) => {
            let order = paypal.get_order(&body.order_id).await?;
            if !order.is_completed() {
                return Err(capture_error.into());
            }
            tracing::info!(order_id = %body.order_id, "PayPal order was already captured");
            order
        }
    };

    let response = settle_paypal_order(&state, auth.user_id, &order).await?;

    Ok(Json(CaptureOrderResponse {
        success: response.success,
        status: order.status,
        already_unlocked: response.already_unlocked,
    }))
}

// ============================================================================
// Bank transfers
// ============================================================================

/// Bank transfer confirmation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmBankTransferRequest {
    /// Reference the fan quoted when claiming the transfer.
    pub payment_reference: String,
    /// Amount that arrived on the platform account, in cents.
    pub amount_received_cents: i64,
}

/// Settle a fan's bank transfer claim after the money arrived (admin only).
pub async fn admin_confirm_bank_transfer(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<ConfirmBankTransferRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    let response =
        confirm_bank_transfer(&state, &body.payment_reference, body.amount_received_cents).await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        payment_reference = %body.payment_reference.trim(),
        amount_received_cents = %body.amount_received_cents,
        already_unlocked = %response.already_unlocked,
        "Bank transfer confirmed"
    );

    Ok(Json(response))
}
