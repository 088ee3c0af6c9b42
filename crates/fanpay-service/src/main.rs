//! fanpay service - HTTP API for creator monetization.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fanpay_service::{create_router, AppState, ServiceConfig};
use fanpay_store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fanpay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting fanpay service");

    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        database_configured = %config.database_url.is_some(),
        jwt_configured = %config.auth_jwt_secret.is_some(),
        stripe_configured = %config.stripe_api_key.is_some(),
        paypal_configured = %config.paypal_client_id.is_some(),
        platform_fee_bps = %config.platform_fee_bps,
        currency = %config.currency,
        "Service configuration loaded"
    );

    let store: Arc<dyn Store> = if let Some(url) = &config.database_url {
        tracing::info!(
            max_connections = %config.database_max_connections,
            "Connecting to PostgreSQL"
        );
        Arc::new(PgStore::connect(url, config.database_max_connections).await?)
    } else {
        tracing::warn!("DATABASE_URL not set - using in-memory store, data will not persist");
        Arc::new(MemoryStore::new())
    };

    let state = AppState::new(store, config.clone());

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
