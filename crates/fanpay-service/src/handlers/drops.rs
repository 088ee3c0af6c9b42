//! Flash drops: creation, listing and the unlock simulator.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fanpay_core::{DropId, FlashDrop, RoomId};
use fanpay_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Create drop request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDropRequest {
    /// Display title.
    pub title: String,
    /// Price per unlock in cents.
    pub price_cents: i64,
    /// Units on offer.
    pub inventory: i64,
    /// Opening time (default: now).
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    /// Closing time.
    pub ends_at: DateTime<Utc>,
}

/// Open a flash drop in a room, sold by the caller.
pub async fn create_drop(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(room_id): Path<RoomId>,
    Json(body): Json<CreateDropRequest>,
) -> Result<Json<FlashDrop>, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::InvalidInput("title is required".into()));
    }
    let drop = FlashDrop::new(
        room_id,
        auth.user_id,
        body.title.trim().to_string(),
        body.price_cents,
        body.inventory,
        body.starts_at.unwrap_or_else(Utc::now),
        body.ends_at,
    )?;
    state.store.put_flash_drop(&drop).await?;

    tracing::info!(
        drop_id = %drop.id,
        room_id = %room_id,
        creator_id = %auth.user_id,
        inventory = %drop.inventory_total,
        "Flash drop created"
    );

    Ok(Json(drop))
}

/// Active drops response.
#[derive(Debug, Serialize)]
pub struct ListDropsResponse {
    /// Drops that have not ended, newest first.
    pub drops: Vec<FlashDrop>,
}

/// List a room's drops that have not ended yet.
pub async fn list_drops(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<ListDropsResponse>, ApiError> {
    let now = Utc::now();
    let drops = state
        .store
        .list_flash_drops(room_id)
        .await?
        .into_iter()
        .filter(|d| d.is_live_at(now))
        .collect();

    Ok(Json(ListDropsResponse { drops }))
}

/// Simulate request.
#[derive(Debug, Deserialize)]
pub struct SimulateUnlockRequest {
    /// Unlocks to simulate (default: 1).
    #[serde(default = "default_count")]
    pub count: i64,
}

fn default_count() -> i64 {
    1
}

/// Simulate response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateUnlockResponse {
    /// Always true on success.
    pub success: bool,
    /// Units actually consumed.
    pub actual_unlocks: i64,
    /// The drop after the update.
    pub drop: FlashDrop,
}

/// Consume drop inventory without taking payment.
///
/// The body is optional; an empty body simulates one unlock.
pub async fn simulate_unlock(
    State(state): State<Arc<AppState>>,
    Path((room_id, drop_id)): Path<(RoomId, DropId)>,
    body: Option<Json<SimulateUnlockRequest>>,
) -> Result<Json<SimulateUnlockResponse>, ApiError> {
    let count = body.map_or_else(default_count, |Json(b)| b.count);

    let consumed = state
        .store
        .consume_flash_drop(drop_id, room_id, count)
        .await
        .map_err(|e| match e {
            fanpay_store::StoreError::NotFound => ApiError::NotFound("Flash drop not found".into()),
            other => other.into(),
        })?;

    tracing::info!(
        drop_id = %drop_id,
        requested = %count,
        actual_unlocks = %consumed.actual_unlocks,
        inventory_remaining = %consumed.drop.inventory_remaining,
        "Flash drop unlocks simulated"
    );

    Ok(Json(SimulateUnlockResponse {
        success: true,
        actual_unlocks: consumed.actual_unlocks,
        drop: consumed.drop,
    }))
}
