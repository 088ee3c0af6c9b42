//! Wallet balance, ledger history and admin top-ups.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use fanpay_core::{EntryType, LedgerEntry, UserId};
use fanpay_store::Store;

use crate::auth::{AdminAuth, AuthUser};
use crate::error::ApiError;
use crate::state::AppState;

/// Most ledger entries returned per page.
const MAX_PAGE_SIZE: usize = 100;

/// Balance response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    /// Wallet owner.
    pub user_id: UserId,
    /// Balance in cents.
    pub balance_cents: i64,
    /// Balance formatted as currency units.
    pub balance_formatted: String,
}

/// Get the caller's wallet.
pub async fn get_wallet(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<WalletResponse>, ApiError> {
    let wallet = state.store.get_wallet(auth.user_id).await?;

    Ok(Json(WalletResponse {
        user_id: wallet.user_id,
        balance_cents: wallet.balance_cents,
        balance_formatted: format_cents(wallet.balance_cents),
    }))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of entries to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// List transactions response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTransactionsResponse {
    /// Ledger entries (newest first).
    pub transactions: Vec<LedgerEntry>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// List the caller's ledger entries.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let mut transactions = state
        .store
        .list_ledger(auth.user_id, limit + 1, query.offset)
        .await?;

    let has_more = transactions.len() > limit;
    transactions.truncate(limit);

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

/// Admin top-up request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    /// Wallet to credit.
    pub user_id: UserId,
    /// Amount in cents.
    pub amount_cents: i64,
    /// Reason, kept on the ledger entry.
    pub reason: String,
}

/// Top-up response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpResponse {
    /// Whether the credit was applied.
    pub success: bool,
    /// Balance after the credit.
    pub balance_cents: i64,
}

/// Credit a wallet (admin only).
pub async fn admin_top_up(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<TopUpRequest>,
) -> Result<Json<TopUpResponse>, ApiError> {
    if body.amount_cents <= 0 {
        return Err(ApiError::InvalidInput("amountCents must be positive".into()));
    }
    if body.reason.trim().is_empty() {
        return Err(ApiError::InvalidInput("reason is required".into()));
    }

    let entry = LedgerEntry::credit(body.user_id, body.amount_cents, EntryType::TopUp, body.reason)
        .with_metadata(json!({ "admin_id": admin.admin_id }));
    let balance_cents = state.store.top_up(entry).await?;

    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %body.user_id,
        amount_cents = %body.amount_cents,
        balance_cents = %balance_cents,
        "Admin wallet top-up"
    );

    Ok(Json(TopUpResponse {
        success: true,
        balance_cents,
    }))
}

fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_are_formatted_with_two_decimals() {
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(1_205), "12.05");
        assert_eq!(format_cents(-50), "-0.50");
    }
}
