//! Priced resources: creators post them, everyone sees the teaser.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fanpay_core::{PricedResource, ResourceKind, ResourceRef, RoomId, UserId};
use fanpay_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::unlock::parse_resource_id;

/// Resource as shown to a given viewer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceView {
    /// Kind and id.
    pub resource: ResourceRef,
    /// Owning creator.
    pub creator_id: UserId,
    /// Room, if any.
    pub room_id: Option<RoomId>,
    /// Teaser.
    pub title: String,
    /// Content, only for the creator and fans who unlocked it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Unlock price in cents.
    pub price_cents: i64,
    /// Whether the viewer can read the body.
    pub unlocked: bool,
    /// Posting time.
    pub created_at: DateTime<Utc>,
}

impl ResourceView {
    fn new(resource: PricedResource, unlocked: bool) -> Self {
        Self {
            resource: resource.resource,
            creator_id: resource.creator_id,
            room_id: resource.room_id,
            title: resource.title,
            body: unlocked.then_some(resource.body),
            price_cents: resource.price_cents,
            unlocked,
            created_at: resource.created_at,
        }
    }
}

/// Create resource request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceRequest {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Room to post in.
    #[serde(default)]
    pub room_id: Option<RoomId>,
    /// Teaser.
    pub title: String,
    /// Paid content.
    pub body: String,
    /// Unlock price in cents.
    pub price_cents: i64,
}

/// Post a priced resource as the caller.
pub async fn create_resource(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateResourceRequest>,
) -> Result<Json<ResourceView>, ApiError> {
    let resource = PricedResource::new(
        body.kind,
        auth.user_id,
        body.room_id,
        body.title,
        body.body,
        body.price_cents,
    )?;
    state.store.put_resource(&resource).await?;

    tracing::info!(
        creator_id = %auth.user_id,
        resource = %resource.resource,
        price_cents = %resource.price_cents,
        "Resource created"
    );

    Ok(Json(ResourceView::new(resource, true)))
}

/// Get a resource; the body is hidden until the viewer has access.
pub async fn get_resource(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<ResourceView>, ApiError> {
    let target = ResourceRef::new(kind.parse()?, parse_resource_id(&id)?);
    let resource = state
        .store
        .get_resource(target)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} not found", target.kind)))?;

    let unlocked = resource.creator_id == auth.user_id
        || state.store.get_unlock(auth.user_id, target).await?.is_some();

    Ok(Json(ResourceView::new(resource, unlocked)))
}
