//! Common test utilities for fanpay integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};

use fanpay_core::UserId;
use fanpay_service::auth::JwtClaims;
use fanpay_service::{create_router, AppState, ServiceConfig};
use fanpay_store::MemoryStore;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const ISSUER: &str = "fanpay-test";
pub const SERVICE_API_KEY: &str = "test-service-key";
pub const ADMIN_API_KEY: &str = "test-admin-key";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Backing store, for assertions that bypass the API.
    pub store: Arc<MemoryStore>,
    /// A fan with a wallet.
    pub fan_id: UserId,
    /// A creator who posts resources.
    pub creator_id: UserId,
}

impl TestHarness {
    /// Harness without payment providers.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Harness whose Stripe and `PayPal` clients point at `base_url`.
    pub fn with_providers(base_url: &str) -> Self {
        let base_url = base_url.to_string();
        Self::with_config(move |config| {
            config.stripe_api_key = Some("sk_test_123".into());
            config.stripe_api_base = base_url.clone();
            config.stripe_webhook_secret = Some(WEBHOOK_SECRET.into());
            config.paypal_client_id = Some("paypal-client".into());
            config.paypal_client_secret = Some("paypal-secret".into());
            config.paypal_api_base = base_url;
        })
    }

    /// Harness with a customized configuration.
    pub fn with_config(customize: impl FnOnce(&mut ServiceConfig)) -> Self {
        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            auth_jwt_secret: Some(JWT_SECRET.into()),
            auth_issuer: ISSUER.into(),
            admin_api_key: Some(ADMIN_API_KEY.into()),
            service_api_key: Some(SERVICE_API_KEY.into()),
            ..ServiceConfig::default()
        };
        customize(&mut config);

        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            fan_id: UserId::generate(),
            creator_id: UserId::generate(),
        }
    }

    /// `Authorization: Bearer <jwt>` for `user_id`.
    pub fn bearer(user_id: UserId) -> HeaderValue {
        let now = chrono::Utc::now().timestamp();
        let claims = JwtClaims {
            sub: user_id.to_string(),
            iss: ISSUER.into(),
            exp: now + 3600,
            iat: now,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("Failed to sign token");
        HeaderValue::from_str(&format!("Bearer {token}")).expect("Invalid header value")
    }

    pub fn fan_auth(&self) -> HeaderValue {
        Self::bearer(self.fan_id)
    }

    pub fn creator_auth(&self) -> HeaderValue {
        Self::bearer(self.creator_id)
    }

    /// Credit `user_id` through the admin top-up endpoint.
    pub async fn fund(&self, user_id: UserId, amount_cents: i64) {
        self.server
            .post("/v1/admin/wallets/top-up")
            .add_header(admin_key(), HeaderValue::from_static(ADMIN_API_KEY))
            .json(&json!({
                "userId": user_id.to_string(),
                "amountCents": amount_cents,
                "reason": "Test funding"
            }))
            .await
            .assert_status_ok();
    }

    /// Wallet balance of `user_id` as seen through the API.
    pub async fn balance(&self, user_id: UserId) -> i64 {
        let response = self
            .server
            .get("/v1/wallet")
            .add_header(authorization(), Self::bearer(user_id))
            .await;
        response.assert_status_ok();
        response.json::<Value>()["balanceCents"]
            .as_i64()
            .expect("balanceCents")
    }

    /// Post a resource as the creator and return its id.
    pub async fn post_resource(&self, kind: &str, room_id: Option<&str>, price_cents: i64) -> String {
        let response = self
            .server
            .post("/v1/resources")
            .add_header(authorization(), self.creator_auth())
            .json(&json!({
                "kind": kind,
                "roomId": room_id,
                "title": "Teaser",
                "body": "The paid part",
                "priceCents": price_cents
            }))
            .await;
        response.assert_status_ok();
        response.json::<Value>()["resource"]["id"]
            .as_str()
            .expect("resource id")
            .to_string()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn authorization() -> HeaderName {
    axum::http::header::AUTHORIZATION
}

pub fn admin_key() -> HeaderName {
    HeaderName::from_static("x-admin-key")
}

pub fn api_key() -> HeaderName {
    HeaderName::from_static("x-api-key")
}

pub fn service_key_value() -> HeaderValue {
    HeaderValue::from_static(SERVICE_API_KEY)
}

pub fn admin_key_value() -> HeaderValue {
    HeaderValue::from_static(ADMIN_API_KEY)
}
