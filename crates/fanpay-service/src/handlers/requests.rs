//! Paid requests: escrowed fan-to-creator tasks.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use fanpay_core::{
    EntryType, LedgerEntry, PaidRequest, RequestAction, RequestId, RequestSettlement,
    RequestTransition, RevenueEvent, RevenueKind, RoomId, TransitionPlan, UserId,
};
use fanpay_store::{RequestUpdate, RevenueRecord, Store, TransitionOutcome};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// How many times a transition is re-planned after losing a race.
const MAX_TRANSITION_ATTEMPTS: usize = 2;

/// Request envelope.
#[derive(Debug, Serialize)]
pub struct RequestResponse {
    /// Always true on success.
    pub success: bool,
    /// The request after the operation.
    pub request: PaidRequest,
}

/// Create request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestBody {
    /// Creator asked to fulfil the request.
    pub creator_id: UserId,
    /// What the fan wants.
    pub description: String,
    /// Price held in escrow, in cents.
    pub price_cents: i64,
}

/// Open a request and escrow its price from the caller's wallet.
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(room_id): Path<RoomId>,
    Json(body): Json<CreateRequestBody>,
) -> Result<Json<RequestResponse>, ApiError> {
    let request = PaidRequest::new(
        room_id,
        auth.user_id,
        body.creator_id,
        body.description,
        body.price_cents,
    )?;
    let escrow = LedgerEntry::debit(
        auth.user_id,
        request.price_cents,
        EntryType::RequestEscrow,
        "Paid request escrow",
    )
    .with_metadata(json!({ "request_id": request.id, "room_id": room_id }));

    state.store.create_paid_request(&request, escrow).await?;

    tracing::info!(
        request_id = %request.id,
        fan_id = %request.fan_id,
        creator_id = %request.creator_id,
        price_cents = %request.price_cents,
        "Paid request created"
    );

    Ok(Json(RequestResponse {
        success: true,
        request,
    }))
}

async fn load_request(
    state: &AppState,
    room_id: RoomId,
    request_id: RequestId,
) -> Result<PaidRequest, ApiError> {
    state
        .store
        .get_paid_request(request_id)
        .await?
        .filter(|r| r.room_id == room_id)
        .ok_or_else(|| ApiError::NotFound("Request not found".into()))
}

/// Get a request. Only its fan and creator may read it.
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((room_id, request_id)): Path<(RoomId, RequestId)>,
) -> Result<Json<RequestResponse>, ApiError> {
    let request = load_request(&state, room_id, request_id).await?;
    if auth.user_id != request.fan_id && auth.user_id != request.creator_id {
        return Err(ApiError::Forbidden("Not a party to this request".into()));
    }
    Ok(Json(RequestResponse {
        success: true,
        request,
    }))
}

/// Transition body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionBody {
    /// `accept`, `reject`, `deliver` or `approve`.
    pub action: String,
    /// Required for `deliver`.
    #[serde(default)]
    pub delivery_content: Option<String>,
}

/// Apply an action to a request.
///
/// Retrying the action that produced the current state succeeds without moving
/// money again.
pub async fn transition_request(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((room_id, request_id)): Path<(RoomId, RequestId)>,
    Json(body): Json<TransitionBody>,
) -> Result<Json<RequestResponse>, ApiError> {
    let action: RequestAction = body.action.parse()?;
    let mut request = load_request(&state, room_id, request_id).await?;

    for _ in 0..MAX_TRANSITION_ATTEMPTS {
        let transition = match request.plan(auth.user_id, action, body.delivery_content.clone())? {
            TransitionPlan::AlreadyApplied => {
                tracing::debug!(
                    request_id = %request.id,
                    action = %action.as_str(),
                    "Transition already applied"
                );
                return Ok(Json(RequestResponse {
                    success: true,
                    request,
                }));
            }
            TransitionPlan::Apply(transition) => transition,
        };

        let update = settlement_update(&state, &request, transition);
        match state.store.apply_request_transition(update).await? {
            TransitionOutcome::Applied(updated) => {
                tracing::info!(
                    request_id = %updated.id,
                    action = %action.as_str(),
                    status = %updated.status.as_str(),
                    "Paid request transitioned"
                );
                return Ok(Json(RequestResponse {
                    success: true,
                    request: updated,
                }));
            }
            TransitionOutcome::Stale(current) => {
                tracing::debug!(request_id = %current.id, "Request changed, re-planning");
                request = current;
            }
        }
    }

    Err(ApiError::InvalidTransition(
        "Request changed while the action was applied".into(),
    ))
}

/// Attach the ledger entry and revenue implied by a transition.
fn settlement_update(
    state: &AppState,
    request: &PaidRequest,
    transition: RequestTransition,
) -> RequestUpdate {
    let metadata = json!({ "request_id": request.id, "room_id": request.room_id });

    let (ledger, revenue) = match transition.settlement {
        RequestSettlement::None => (None, None),
        RequestSettlement::RefundFan {
            user_id,
            amount_cents,
        } => (
            Some(
                LedgerEntry::credit(
                    user_id,
                    amount_cents,
                    EntryType::RequestRefund,
                    "Paid request rejected",
                )
                .with_metadata(metadata),
            ),
            None,
        ),
        RequestSettlement::PayCreator {
            user_id,
            amount_cents,
        } => {
            let event = RevenueEvent::completed(
                user_id,
                request.fan_id,
                RevenueKind::Request,
                state.config.currency.clone(),
                amount_cents,
            )
            .in_room(Some(request.room_id));
            let splits = state.split_policy.split(&event);
            (
                Some(
                    LedgerEntry::credit(
                        user_id,
                        amount_cents,
                        EntryType::RequestPayout,
                        "Paid request completed",
                    )
                    .with_metadata(metadata),
                ),
                Some(RevenueRecord { event, splits }),
            )
        }
    };

    RequestUpdate {
        transition,
        ledger,
        revenue,
    }
}
