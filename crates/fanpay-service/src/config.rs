//! Service configuration.

use serde::Deserialize;
use std::path::Path;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Postgres connection string. Without it the service runs in memory.
    pub database_url: Option<String>,

    /// Maximum Postgres pool size.
    pub database_max_connections: u32,

    /// HS256 secret used to validate user JWTs.
    pub auth_jwt_secret: Option<String>,

    /// Expected JWT issuer (default: "fanpay").
    pub auth_issuer: String,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Stripe secret key (optional).
    pub stripe_api_key: Option<String>,

    /// Stripe API base URL.
    pub stripe_api_base: String,

    /// Stripe webhook signing secret (optional).
    pub stripe_webhook_secret: Option<String>,

    /// `PayPal` REST client id (optional).
    pub paypal_client_id: Option<String>,

    /// `PayPal` REST client secret (optional).
    pub paypal_client_secret: Option<String>,

    /// `PayPal` API base URL (sandbox by default).
    pub paypal_api_base: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Platform share of revenue the service records itself, in basis points.
    pub platform_fee_bps: i64,

    /// Currency code used for charges and revenue events.
    pub currency: String,
}

/// Stripe secrets file structure.
#[derive(Debug, Deserialize)]
struct StripeSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

/// `PayPal` secrets file structure.
#[derive(Debug, Deserialize)]
struct PaypalSecrets {
    client_id: String,
    client_secret: String,
}

const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_PAYPAL_API_BASE: &str = "https://api-m.sandbox.paypal.com";

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let (stripe_api_key, stripe_webhook_secret) = load_stripe_secrets();
        let (paypal_client_id, paypal_client_secret) = load_paypal_secrets();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            database_url: std::env::var("DATABASE_URL").ok(),
            database_max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            auth_jwt_secret: std::env::var("AUTH_JWT_SECRET").ok(),
            auth_issuer: std::env::var("AUTH_ISSUER").unwrap_or_else(|_| "fanpay".into()),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            stripe_api_key,
            stripe_api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| DEFAULT_STRIPE_API_BASE.into()),
            stripe_webhook_secret,
            paypal_client_id,
            paypal_client_secret,
            paypal_api_base: std::env::var("PAYPAL_API_BASE")
                .unwrap_or_else(|_| DEFAULT_PAYPAL_API_BASE.into()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            platform_fee_bps: std::env::var("PLATFORM_FEE_BPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2000),
            currency: std::env::var("CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or_else(|_| "usd".into()),
        }
    }
}

/// Load Stripe secrets from file or environment.
fn load_stripe_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/stripe.json", "../.secrets/stripe.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<StripeSecrets>(path) {
            tracing::info!(path = %path, "Loaded Stripe secrets from file");
            return (Some(secrets.api_key), secrets.webhook_secret);
        }
    }

    tracing::debug!("Stripe secrets file not found, using environment variables");
    (
        std::env::var("STRIPE_API_KEY").ok(),
        std::env::var("STRIPE_WEBHOOK_SECRET").ok(),
    )
}

/// Load `PayPal` secrets from file or environment.
fn load_paypal_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [".secrets/paypal.json", "../.secrets/paypal.json"];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<PaypalSecrets>(path) {
            tracing::info!(path = %path, "Loaded PayPal secrets from file");
            return (Some(secrets.client_id), Some(secrets.client_secret));
        }
    }

    tracing::debug!("PayPal secrets file not found, using environment variables");
    (
        std::env::var("PAYPAL_CLIENT_ID").ok(),
        std::env::var("PAYPAL_CLIENT_SECRET").ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            database_max_connections: 10,
            auth_jwt_secret: None,
            auth_issuer: "fanpay".into(),
            admin_api_key: None,
            service_api_key: None,
            stripe_api_key: None,
            stripe_api_base: DEFAULT_STRIPE_API_BASE.into(),
            stripe_webhook_secret: None,
            paypal_client_id: None,
            paypal_client_secret: None,
            paypal_api_base: DEFAULT_PAYPAL_API_BASE.into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            platform_fee_bps: 2000,
            currency: "usd".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_secrets_file_is_not_found() {
        let err = load_secrets_file::<StripeSecrets>("does/not/exist.json").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn default_config_has_no_providers() {
        let config = ServiceConfig::default();
        assert!(config.stripe_api_key.is_none());
        assert!(config.paypal_client_id.is_none());
        assert_eq!(config.platform_fee_bps, 2000);
        assert_eq!(config.currency, "usd");
    }
}
