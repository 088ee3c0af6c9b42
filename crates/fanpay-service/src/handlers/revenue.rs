//! Revenue ingestion from upstream services (metered chat, live rounds).

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fanpay_core::{
    ActivitySession, Beneficiary, RevenueEvent, RevenueEventId, RevenueKind, RevenueSplit,
    RevenueStatus, RoomId, SessionId, UserId,
};
use fanpay_store::{RevenueRecord, Store};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// One split as reported upstream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitInput {
    /// Who receives the share.
    pub beneficiary: Beneficiary,
    /// Share in cents.
    pub amount_cents: i64,
    /// Named split profile.
    #[serde(default)]
    pub split_profile: Option<String>,
}

/// Revenue event as reported upstream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueEventInput {
    /// Creator credited.
    pub creator_id: UserId,
    /// Paying fan.
    pub fan_id: UserId,
    /// Room, if any.
    #[serde(default)]
    pub room_id: Option<RoomId>,
    /// Linked activity session.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// What was sold.
    pub kind: RevenueKind,
    /// Currency (default: the service currency).
    #[serde(default)]
    pub currency: Option<String>,
    /// Gross amount in cents.
    pub gross_amount_cents: i64,
    /// Settlement state (default: completed).
    #[serde(default)]
    pub status: Option<RevenueStatus>,
    /// When it happened (default: now).
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    /// Splits, in order. The platform split policy applies when omitted.
    #[serde(default)]
    pub splits: Option<Vec<SplitInput>>,
}

/// Ingest response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRevenueResponse {
    /// Always true on success.
    pub success: bool,
    /// Id of the stored event.
    pub event_id: RevenueEventId,
    /// Number of splits stored.
    pub splits: usize,
}

/// Record a revenue event with its splits.
pub async fn record_revenue_event(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<RevenueEventInput>,
) -> Result<Json<RecordRevenueResponse>, ApiError> {
    if body.gross_amount_cents < 0 {
        return Err(ApiError::InvalidInput(
            "grossAmountCents cannot be negative".into(),
        ));
    }

    let currency = body
        .currency
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| state.config.currency.clone());

    let mut event = RevenueEvent::completed(
        body.creator_id,
        body.fan_id,
        body.kind,
        currency,
        body.gross_amount_cents,
    )
    .in_room(body.room_id)
    .in_session(body.session_id);
    if let Some(status) = body.status {
        event.status = status;
    }
    if let Some(at) = body.occurred_at {
        event.occurred_at = at;
    }

    let splits = match body.splits {
        Some(splits) => splits
            .into_iter()
            .map(|s| RevenueSplit {
                event_id: event.id,
                beneficiary: s.beneficiary,
                amount_cents: s.amount_cents,
                split_profile: s.split_profile,
            })
            .collect(),
        None => state.split_policy.split(&event),
    };

    let event_id = event.id;
    let split_count = splits.len();
    state
        .store
        .record_revenue(RevenueRecord { event, splits })
        .await?;

    tracing::info!(
        service = %service.service_name,
        event_id = %event_id,
        creator_id = %body.creator_id,
        kind = %body.kind.as_str(),
        gross_cents = %body.gross_amount_cents,
        "Revenue event recorded"
    );

    Ok(Json(RecordRevenueResponse {
        success: true,
        event_id,
        splits: split_count,
    }))
}

/// Activity session as reported upstream.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySessionInput {
    /// Existing session to update (default: a new session).
    #[serde(default)]
    pub id: Option<SessionId>,
    /// Room, if any.
    #[serde(default)]
    pub room_id: Option<RoomId>,
    /// Hosting creator.
    pub creator_id: UserId,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time, once finished.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// Record or update a timed activity session.
pub async fn record_activity_session(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<ActivitySessionInput>,
) -> Result<Json<ActivitySession>, ApiError> {
    if body.ended_at.is_some_and(|end| end < body.started_at) {
        return Err(ApiError::InvalidInput(
            "endedAt cannot be before startedAt".into(),
        ));
    }

    let session = ActivitySession {
        id: body.id.unwrap_or_else(SessionId::generate),
        room_id: body.room_id,
        creator_id: body.creator_id,
        started_at: body.started_at,
        ended_at: body.ended_at,
    };
    state.store.put_activity_session(&session).await?;

    tracing::info!(
        service = %service.service_name,
        session_id = %session.id,
        creator_id = %session.creator_id,
        "Activity session recorded"
    );

    Ok(Json(session))
}
