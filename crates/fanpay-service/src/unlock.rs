//! Unlock orchestration shared by the unlock routes, payment confirmation and
//! the Stripe webhook.
//!
//! Every paid path ends in exactly one store call ([`Store::unlock_with_wallet`]
//! or [`Store::settle_external_unlock`]), which re-checks uniqueness and writes
//! the unlock, ledger entries and revenue event atomically. Bank transfers are
//! recorded as pending claims and settle only through [`confirm_bank_transfer`].

use serde::Serialize;
use serde_json::json;

use fanpay_core::{
    BankTransferClaim, BillingError, EntryType, LedgerEntry, PaymentMethod, PricedResource,
    ResourceId, ResourceKind, ResourceRef, RevenueEvent, RevenueKind, RoomId, UnlockRecord,
    UserId,
};
use fanpay_store::{
    ExternalSettlement, RevenueRecord, Store, StoreError, UnlockOutcome, WalletUnlock,
};

use crate::error::ApiError;
use crate::paypal::Order;
use crate::state::AppState;
use crate::stripe::PaymentIntent;

/// Metadata keys written on Stripe intents.
pub mod meta {
    /// Paying user.
    pub const USER_ID: &str = "user_id";
    /// Room of the resource, if any.
    pub const ROOM_ID: &str = "room_id";
    /// Resource kind.
    pub const RESOURCE_TYPE: &str = "resource_type";
    /// Resource id.
    pub const RESOURCE_ID: &str = "resource_id";
}

/// Response of every unlock path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockResponse {
    /// Whether the caller now has access.
    pub success: bool,
    /// Extra context for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Whether access was granted by an earlier unlock.
    pub already_unlocked: bool,
    /// Whether the payment awaits confirmation before access is granted.
    pub pending: bool,
}

impl UnlockResponse {
    fn unlocked() -> Self {
        Self {
            success: true,
            message: None,
            already_unlocked: false,
            pending: false,
        }
    }

    fn already_unlocked() -> Self {
        Self {
            success: true,
            message: Some("Already unlocked".into()),
            already_unlocked: true,
            pending: false,
        }
    }

    fn owner() -> Self {
        Self {
            success: true,
            message: Some("Creators always have access to their own content".into()),
            already_unlocked: false,
            pending: false,
        }
    }

    fn awaiting_transfer() -> Self {
        Self {
            success: false,
            message: Some("Bank transfer recorded, access is granted once it is confirmed".into()),
            already_unlocked: false,
            pending: true,
        }
    }

    fn from_outcome(outcome: &UnlockOutcome) -> Self {
        if outcome.already_unlocked() {
            Self::already_unlocked()
        } else {
            Self::unlocked()
        }
    }
}

/// Unlock `target` for `user_id`, paying with `method`.
///
/// # Errors
///
/// - `NotFound` if the resource does not exist.
/// - `InvalidInput` if an external method has no payment reference.
/// - `InsufficientFunds` for a wallet that cannot cover the price.
/// - `PaymentNotSuccessful` / `InvalidOwner` if the provider payment does not
///   prove this purchase.
/// - `PaymentFailed` if a verified external payment could not be recorded.
///
/// A bank payment only records a pending claim; see [`confirm_bank_transfer`].
pub async fn unlock_resource(
    state: &AppState,
    user_id: UserId,
    target: ResourceRef,
    method: PaymentMethod,
    payment_reference: Option<String>,
) -> Result<UnlockResponse, ApiError> {
    let resource = load_resource(state, target).await?;
    if let Some(done) = existing_access(state, user_id, &resource).await? {
        return Ok(done);
    }

    match method {
        PaymentMethod::Wallet => unlock_with_wallet(state, user_id, &resource).await,
        PaymentMethod::Stripe => {
            let reference = require_reference(payment_reference)?;
            let intent = state.stripe()?.get_payment_intent(&reference).await?;
            verify_stripe_intent(&intent, user_id, &resource, None)?;
            settle_external(state, user_id, &resource, PaymentMethod::Stripe, intent.id).await
        }
        PaymentMethod::Paypal => {
            let reference = require_reference(payment_reference)?;
            let order = state.paypal()?.get_order(&reference).await?;
            verify_paypal_order(&order, user_id, &resource)?;
            settle_external(state, user_id, &resource, PaymentMethod::Paypal, order.id).await
        }
        PaymentMethod::Bank => {
            let reference = require_reference(payment_reference)?;
            submit_bank_claim(state, user_id, &resource, &reference).await
        }
    }
}

/// Record a bank transfer claim for `resource`. Nothing unlocks until
/// [`confirm_bank_transfer`] runs.
async fn submit_bank_claim(
    state: &AppState,
    user_id: UserId,
    resource: &PricedResource,
    reference: &str,
) -> Result<UnlockResponse, ApiError> {
    let claim = BankTransferClaim::new(user_id, resource, reference)?;
    let claim = state.store.submit_bank_claim(claim).await?;

    tracing::info!(
        user_id = %user_id,
        resource = %resource.resource,
        payment_reference = %claim.reference,
        amount_cents = %claim.amount_cents,
        "Bank transfer claim recorded"
    );

    Ok(UnlockResponse::awaiting_transfer())
}

/// Settle the unlock behind a bank transfer claim once the transfer arrived.
///
/// # Errors
///
/// - `NotFound` if no claim carries `reference` or its resource is gone.
/// - `PaymentNotSuccessful` if `received_cents` does not cover the claim.
/// - `PaymentFailed` if the settlement could not be recorded.
pub async fn confirm_bank_transfer(
    state: &AppState,
    reference: &str,
    received_cents: i64,
) -> Result<UnlockResponse, ApiError> {
    let claim = state
        .store
        .get_bank_claim(reference.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound("Bank transfer claim not found".into()))?;
    if received_cents < claim.amount_cents {
        return Err(ApiError::PaymentNotSuccessful(
            "Transfer amount does not cover the price".into(),
        ));
    }

    let resource = load_resource(state, claim.resource).await?;
    if let Some(done) = existing_access(state, claim.user_id, &resource).await? {
        return Ok(done);
    }
    settle_external(
        state,
        claim.user_id,
        &resource,
        PaymentMethod::Bank,
        claim.reference,
    )
    .await
}

/// Settle the resource named in a Stripe intent's metadata.
///
/// `room_id`, when given, must match the intent's `room_id` metadata.
///
/// # Errors
///
/// As [`unlock_resource`]; `InvalidInput` if the intent is not linked to a resource.
pub async fn settle_stripe_intent(
    state: &AppState,
    user_id: UserId,
    intent: &PaymentIntent,
    room_id: Option<RoomId>,
) -> Result<UnlockResponse, ApiError> {
    let target = intent_target(intent)?;
    let resource = load_resource(state, target).await?;
    if let Some(done) = existing_access(state, user_id, &resource).await? {
        return Ok(done);
    }

    verify_stripe_intent(intent, user_id, &resource, room_id)?;
    settle_external(
        state,
        user_id,
        &resource,
        PaymentMethod::Stripe,
        intent.id.clone(),
    )
    .await
}

/// Settle the resource referenced by a captured `PayPal` order.
///
/// # Errors
///
/// As [`unlock_resource`]; `InvalidInput` if the order is not linked to a resource.
pub async fn settle_paypal_order(
    state: &AppState,
    user_id: UserId,
    order: &Order,
) -> Result<UnlockResponse, ApiError> {
    let target = order
        .primary_unit()
        .and_then(|unit| unit.reference_id.as_deref())
        .ok_or_else(|| ApiError::InvalidInput("Order is not linked to a resource".into()))
        .and_then(parse_reference)?;
    let resource = load_resource(state, target).await?;
    if let Some(done) = existing_access(state, user_id, &resource).await? {
        return Ok(done);
    }

    verify_paypal_order(order, user_id, &resource)?;
    settle_external(
        state,
        user_id,
        &resource,
        PaymentMethod::Paypal,
        order.id.clone(),
    )
    .await
}

/// `kind:id`, the resource reference sent to `PayPal`.
#[must_use]
pub fn reference_id(target: ResourceRef) -> String {
    target.to_string()
}

fn parse_reference(reference: &str) -> Result<ResourceRef, ApiError> {
    let (kind, id) = reference
        .split_once(':')
        .ok_or_else(|| ApiError::InvalidInput("Malformed resource reference".into()))?;
    Ok(ResourceRef::new(kind.parse()?, parse_resource_id(id)?))
}

/// Parse a resource id from a path or payload.
///
/// # Errors
///
/// `InvalidInput` if `id` is not a UUID.
pub fn parse_resource_id(id: &str) -> Result<ResourceId, ApiError> {
    id.parse::<ResourceId>()
        .map_err(|e| BillingError::from(e).into())
}

async fn load_resource(state: &AppState, target: ResourceRef) -> Result<PricedResource, ApiError> {
    state
        .store
        .get_resource(target)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} not found", target.kind)))
}

/// Creators own their content; earlier unlocks are honoured without a charge.
async fn existing_access(
    state: &AppState,
    user_id: UserId,
    resource: &PricedResource,
) -> Result<Option<UnlockResponse>, ApiError> {
    if resource.creator_id == user_id {
        return Ok(Some(UnlockResponse::owner()));
    }
    let existing = state.store.get_unlock(user_id, resource.resource).await?;
    Ok(existing.map(|_| UnlockResponse::already_unlocked()))
}

fn require_reference(reference: Option<String>) -> Result<String, ApiError> {
    reference
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("paymentReference is required".into()))
}

fn intent_target(intent: &PaymentIntent) -> Result<ResourceRef, ApiError> {
    let missing = || ApiError::InvalidInput("Payment is not linked to a resource".into());
    let kind: ResourceKind = intent.meta(meta::RESOURCE_TYPE).ok_or_else(missing)?.parse()?;
    let id = parse_resource_id(intent.meta(meta::RESOURCE_ID).ok_or_else(missing)?)?;
    Ok(ResourceRef::new(kind, id))
}

/// Check that a Stripe intent pays for `resource` on behalf of `user_id`.
///
/// # Errors
///
/// `PaymentNotSuccessful` if the intent is unpaid or short, `InvalidOwner` if its
/// metadata names another user, room or resource.
pub fn verify_stripe_intent(
    intent: &PaymentIntent,
    user_id: UserId,
    resource: &PricedResource,
    room_id: Option<RoomId>,
) -> Result<(), ApiError> {
    if !intent.is_succeeded() {
        return Err(ApiError::PaymentNotSuccessful(format!(
            "Payment status is {}",
            intent.status
        )));
    }
    if intent.meta(meta::USER_ID) != Some(user_id.to_string().as_str()) {
        return Err(ApiError::InvalidOwner("Payment belongs to another user".into()));
    }

    let intent_room = intent.meta(meta::ROOM_ID);
    if let Some(room) = intent_room {
        if resource.room_id.map(|r| r.to_string()).as_deref() != Some(room) {
            return Err(ApiError::InvalidOwner("Payment is for another room".into()));
        }
    }
    if let Some(expected) = room_id {
        if intent_room != Some(expected.to_string().as_str()) {
            return Err(ApiError::InvalidOwner("Payment is for another room".into()));
        }
    }
    if let Some(kind) = intent.meta(meta::RESOURCE_TYPE) {
        if kind != resource.resource.kind.as_str() {
            return Err(ApiError::InvalidOwner("Payment is for another resource".into()));
        }
    }
    if let Some(id) = intent.meta(meta::RESOURCE_ID) {
        if id != resource.resource.id.to_string() {
            return Err(ApiError::InvalidOwner("Payment is for another resource".into()));
        }
    }

    if intent.paid_cents() < resource.price_cents {
        return Err(ApiError::PaymentNotSuccessful(
            "Payment amount does not cover the price".into(),
        ));
    }
    Ok(())
}

/// Check that a `PayPal` order pays for `resource` on behalf of `user_id`.
///
/// # Errors
///
/// `PaymentNotSuccessful` if the order is not captured or short, `InvalidOwner`
/// if it references another user or resource.
pub fn verify_paypal_order(
    order: &Order,
    user_id: UserId,
    resource: &PricedResource,
) -> Result<(), ApiError> {
    if !order.is_completed() {
        return Err(ApiError::PaymentNotSuccessful(format!(
            "Order status is {}",
            order.status
        )));
    }
    let unit = order
        .primary_unit()
        .ok_or_else(|| ApiError::PaymentNotSuccessful("Order has no purchase unit".into()))?;

    if unit.custom_id.as_deref() != Some(user_id.to_string().as_str()) {
        return Err(ApiError::InvalidOwner("Payment belongs to another user".into()));
    }
    if unit.reference_id.as_deref() != Some(reference_id(resource.resource).as_str()) {
        return Err(ApiError::InvalidOwner("Payment is for another resource".into()));
    }
    if let Some(paid) = unit.amount.as_ref().and_then(crate::paypal::Money::to_cents) {
        if paid < resource.price_cents {
            return Err(ApiError::PaymentNotSuccessful(
                "Payment amount does not cover the price".into(),
            ));
        }
    }
    Ok(())
}

fn unlock_metadata(
    resource: &PricedResource,
    method: PaymentMethod,
    reference: Option<&str>,
) -> serde_json::Value {
    json!({
        "resource_type": resource.resource.kind.as_str(),
        "resource_id": resource.resource.id,
        "room_id": resource.room_id,
        "payment_method": method.as_str(),
        "payment_reference": reference,
    })
}

fn unlock_revenue(state: &AppState, user_id: UserId, resource: &PricedResource) -> RevenueRecord {
    let event = RevenueEvent::completed(
        resource.creator_id,
        user_id,
        RevenueKind::Unlock,
        state.config.currency.clone(),
        resource.price_cents,
    )
    .in_room(resource.room_id);
    let splits = state.split_policy.split(&event);
    RevenueRecord { event, splits }
}

async fn unlock_with_wallet(
    state: &AppState,
    user_id: UserId,
    resource: &PricedResource,
) -> Result<UnlockResponse, ApiError> {
    let metadata = unlock_metadata(resource, PaymentMethod::Wallet, None);
    let unlock = WalletUnlock {
        record: UnlockRecord::new(user_id, resource, PaymentMethod::Wallet, None),
        fan_debit: LedgerEntry::debit(
            user_id,
            resource.price_cents,
            EntryType::UnlockPurchase,
            format!("Unlocked {}", resource.resource.kind),
        )
        .with_metadata(metadata.clone()),
        creator_credit: LedgerEntry::credit(
            resource.creator_id,
            resource.price_cents,
            EntryType::UnlockEarning,
            format!("{} unlocked", resource.resource.kind),
        )
        .with_metadata(metadata),
        revenue: unlock_revenue(state, user_id, resource),
    };

    let outcome = state.store.unlock_with_wallet(unlock).await?;

    tracing::info!(
        user_id = %user_id,
        resource = %resource.resource,
        price_cents = %resource.price_cents,
        already_unlocked = %outcome.already_unlocked(),
        "Wallet unlock"
    );

    Ok(UnlockResponse::from_outcome(&outcome))
}

async fn settle_external(
    state: &AppState,
    user_id: UserId,
    resource: &PricedResource,
    method: PaymentMethod,
    reference: String,
) -> Result<UnlockResponse, ApiError> {
    let settlement = ExternalSettlement {
        record: UnlockRecord::new(user_id, resource, method, Some(reference.clone())),
        creator_credit: LedgerEntry::credit(
            resource.creator_id,
            resource.price_cents,
            EntryType::ExternalEarning,
            format!("{} unlocked via {}", resource.resource.kind, method.as_str()),
        )
        .with_metadata(unlock_metadata(resource, method, Some(&reference))),
        revenue: unlock_revenue(state, user_id, resource),
    };

    let outcome = state
        .store
        .settle_external_unlock(settlement)
        .await
        .map_err(|e| match e {
            StoreError::DuplicatePaymentReference { .. } => ApiError::from(e),
            other => ApiError::PaymentFailed(other.to_string()),
        })?;

    tracing::info!(
        user_id = %user_id,
        resource = %resource.resource,
        payment_method = %method.as_str(),
        payment_reference = %reference,
        already_unlocked = %outcome.already_unlocked(),
        "External unlock settled"
    );

    Ok(UnlockResponse::from_outcome(&outcome))
}
