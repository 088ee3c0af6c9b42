//! Monthly creator invoices.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use fanpay_core::{build_invoice, month_window, Invoice, UserId};
use fanpay_store::Store;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Invoice query. Both parameters are required.
#[derive(Debug, Deserialize)]
pub struct InvoiceQuery {
    /// Calendar year.
    pub year: Option<String>,
    /// Calendar month (1-12).
    pub month: Option<String>,
}

/// Reconcile one creator's month of revenue.
pub async fn creator_invoice(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(creator_id): Path<UserId>,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<Invoice>, ApiError> {
    let (Some(year), Some(month)) = (query.year, query.month) else {
        return Err(ApiError::MissingParams("year and month are required".into()));
    };
    let year: i32 = year
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidInput(format!("invalid year: {year}")))?;
    let month: u32 = month
        .trim()
        .parse()
        .map_err(|_| ApiError::InvalidInput(format!("invalid month: {month}")))?;

    let window = month_window(year, month)?;
    let inputs = state.store.load_invoice_inputs(creator_id, window).await?;
    let invoice = build_invoice(creator_id, year, month, inputs)?;

    tracing::info!(
        admin_id = %admin.admin_id,
        creator_id = %creator_id,
        year = %year,
        month = %month,
        events = %invoice.summary.events_count,
        gross_cents = %invoice.summary.gross_collected_cents,
        "Invoice built"
    );

    Ok(Json(invoice))
}
