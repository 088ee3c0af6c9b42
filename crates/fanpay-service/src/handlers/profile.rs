//! User profile.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use fanpay_core::UserProfile;
use fanpay_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Profile update body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    /// Handle shown in rooms.
    pub username: String,
    /// Optional display name.
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Create or replace the caller's profile.
pub async fn put_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = UserProfile::new(auth.user_id, &body.username, body.full_name)?;
    state.store.put_profile(&profile).await?;

    tracing::debug!(user_id = %auth.user_id, username = %profile.username, "Profile updated");

    Ok(Json(profile))
}
