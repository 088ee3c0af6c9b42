//! Wallet tips.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use fanpay_core::{EntryType, LedgerEntry, RevenueEvent, RevenueKind, RoomId, UserId};
use fanpay_store::{RevenueRecord, Store, TipTransfer};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Longest tip message kept on the ledger.
const MAX_TIP_MESSAGE_LEN: usize = 280;

/// Tip request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipRequest {
    /// Creator to tip.
    pub creator_id: UserId,
    /// Amount in cents.
    pub amount_cents: i64,
    /// Optional note.
    #[serde(default)]
    pub message: Option<String>,
}

/// Tip response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TipResponse {
    /// Always true on success.
    pub success: bool,
    /// The fan's balance after the tip.
    pub balance_cents: i64,
}

/// Send a tip from the caller's wallet to a creator.
pub async fn send_tip(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(room_id): Path<RoomId>,
    Json(body): Json<TipRequest>,
) -> Result<Json<TipResponse>, ApiError> {
    if body.amount_cents <= 0 {
        return Err(ApiError::InvalidInput("amountCents must be positive".into()));
    }
    if body.creator_id == auth.user_id {
        return Err(ApiError::InvalidInput("You cannot tip yourself".into()));
    }
    let message = body
        .message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    if message.as_ref().is_some_and(|m| m.len() > MAX_TIP_MESSAGE_LEN) {
        return Err(ApiError::InvalidInput(format!(
            "message is limited to {MAX_TIP_MESSAGE_LEN} bytes"
        )));
    }

    let metadata = json!({ "room_id": room_id, "message": message });
    let event = RevenueEvent::completed(
        body.creator_id,
        auth.user_id,
        RevenueKind::Tip,
        state.config.currency.clone(),
        body.amount_cents,
    )
    .in_room(Some(room_id));
    let splits = state.split_policy.split(&event);

    let tip = TipTransfer {
        fan_debit: LedgerEntry::debit(
            auth.user_id,
            body.amount_cents,
            EntryType::TipSent,
            "Tip sent",
        )
        .with_metadata(metadata.clone()),
        creator_credit: LedgerEntry::credit(
            body.creator_id,
            body.amount_cents,
            EntryType::TipReceived,
            "Tip received",
        )
        .with_metadata(metadata),
        revenue: RevenueRecord { event, splits },
    };
    let balance_cents = state.store.transfer_tip(tip).await?;

    tracing::info!(
        fan_id = %auth.user_id,
        creator_id = %body.creator_id,
        room_id = %room_id,
        amount_cents = %body.amount_cents,
        "Tip sent"
    );

    Ok(Json(TipResponse {
        success: true,
        balance_cents,
    }))
}
