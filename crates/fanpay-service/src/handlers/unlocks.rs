//! Unlock routes for confessions, truth-or-dare rounds and posts.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use fanpay_core::{PaymentMethod, ResourceKind, ResourceRef, UnlockRecord};
use fanpay_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::unlock::{parse_resource_id, unlock_resource, UnlockResponse};

/// Unlock request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRequest {
    /// `wallet`, `stripe`, `paypal` or `bank`.
    pub payment_method: String,
    /// Intent id, order id or bank reference for external methods.
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// `POST /confessions/{id}/unlock`
pub async fn unlock_confession(
    state: State<Arc<AppState>>,
    auth: AuthUser,
    id: Path<String>,
    body: Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    unlock(ResourceKind::Confession, state, auth, id, body).await
}

/// `POST /truth-or-dare/{id}/unlock`
pub async fn unlock_truth_or_dare(
    state: State<Arc<AppState>>,
    auth: AuthUser,
    id: Path<String>,
    body: Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    unlock(ResourceKind::TruthOrDare, state, auth, id, body).await
}

/// `POST /posts/{id}/unlock`
pub async fn unlock_post(
    state: State<Arc<AppState>>,
    auth: AuthUser,
    id: Path<String>,
    body: Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    unlock(ResourceKind::Post, state, auth, id, body).await
}

async fn unlock(
    kind: ResourceKind,
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UnlockRequest>,
) -> Result<Json<UnlockResponse>, ApiError> {
    let target = ResourceRef::new(kind, parse_resource_id(&id)?);
    let method: PaymentMethod = body.payment_method.parse()?;

    let response =
        unlock_resource(&state, auth.user_id, target, method, body.payment_reference).await?;
    Ok(Json(response))
}

/// Unlock list response.
#[derive(Debug, Serialize)]
pub struct ListUnlocksResponse {
    /// The caller's unlocks, newest first.
    pub unlocks: Vec<UnlockRecord>,
}

/// List the caller's unlocks.
pub async fn list_unlocks(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ListUnlocksResponse>, ApiError> {
    let unlocks = state.store.list_unlocks(auth.user_id).await?;
    Ok(Json(ListUnlocksResponse { unlocks }))
}
