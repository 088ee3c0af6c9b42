//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    drops, health, invoices, payments, profile, requests, resources, revenue, tips, unlocks,
    wallet, webhooks,
};
use crate::state::AppState;

/// Maximum concurrent requests for `/v1` endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Maximum concurrent requests for revenue ingestion.
const INGEST_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health`
/// - `GET /v1/rooms/:room_id/flash-drops`
/// - `POST /v1/rooms/:room_id/flash-drops/:drop_id/unlock` - Inventory simulator
///
/// ## Fans and creators (JWT auth)
/// - `GET /v1/wallet`, `GET /v1/wallet/transactions`
/// - `POST /v1/resources`, `GET /v1/resources/:kind/:id`, `GET /v1/unlocks`
/// - `POST /v1/confessions/:id/unlock`, `/v1/truth-or-dare/:id/unlock`, `/v1/posts/:id/unlock`
/// - `POST /v1/payments/stripe/{create-intent,confirm}`
/// - `POST /v1/payments/paypal/{create-order,capture-order}`
/// - `POST /v1/rooms/:room_id/flash-drops`
/// - `POST /v1/rooms/:room_id/requests`, `GET|PATCH /v1/rooms/:room_id/requests/:request_id`
/// - `POST /v1/rooms/:room_id/tips`
/// - `PUT /v1/profile`
///
/// ## Admin (admin API key)
/// - `POST /v1/admin/wallets/top-up`
/// - `POST /v1/admin/bank-transfers/confirm` - Settle a pending bank transfer claim
/// - `GET /v1/admin/payouts/:creator_id/invoice?year=&month=`
///
/// ## Ingestion (service API key)
/// - `POST /v1/admin/revenue-events`, `POST /v1/admin/activity-sessions`
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/stripe`
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let ingest_routes = Router::new()
        .route("/revenue-events", post(revenue::record_revenue_event))
        .route("/activity-sessions", post(revenue::record_activity_session))
        .layer(ConcurrencyLimitLayer::new(INGEST_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Wallet
        .route("/wallet", get(wallet::get_wallet))
        .route("/wallet/transactions", get(wallet::list_transactions))
        .route("/admin/wallets/top-up", post(wallet::admin_top_up))
        // Resources and unlocks
        .route("/resources", post(resources::create_resource))
        .route("/resources/:kind/:id", get(resources::get_resource))
        .route("/unlocks", get(unlocks::list_unlocks))
        .route("/confessions/:id/unlock", post(unlocks::unlock_confession))
        .route("/truth-or-dare/:id/unlock", post(unlocks::unlock_truth_or_dare))
        .route("/posts/:id/unlock", post(unlocks::unlock_post))
        // External payments
        .route(
            "/payments/stripe/create-intent",
            post(payments::stripe_create_intent),
        )
        .route("/payments/stripe/confirm", post(payments::stripe_confirm))
        .route(
            "/payments/paypal/create-order",
            post(payments::paypal_create_order),
        )
        .route(
            "/payments/paypal/capture-order",
            post(payments::paypal_capture_order),
        )
        .route(
            "/admin/bank-transfers/confirm",
            post(payments::admin_confirm_bank_transfer),
        )
        // Rooms
        .route(
            "/rooms/:room_id/flash-drops",
            get(drops::list_drops).post(drops::create_drop),
        )
        .route(
            "/rooms/:room_id/flash-drops/:drop_id/unlock",
            post(drops::simulate_unlock),
        )
        .route("/rooms/:room_id/requests", post(requests::create_request))
        .route(
            "/rooms/:room_id/requests/:request_id",
            get(requests::get_request).patch(requests::transition_request),
        )
        .route("/rooms/:room_id/tips", post(tips::send_tip))
        // Profile
        .route("/profile", put(profile::put_profile))
        // Payouts
        .route(
            "/admin/payouts/:creator_id/invoice",
            get(invoices::creator_invoice),
        )
        .nest("/admin", ingest_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(origins)
    }
}
