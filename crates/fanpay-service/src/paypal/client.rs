//! `PayPal` REST client.

use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::RwLock;

use super::types::{AccessToken, CreateOrderRequest, Money, Order, PaypalErrorResponse, PurchaseUnit};

/// Refresh the token this long before `PayPal` says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Error type for `PayPal` operations.
#[derive(Debug, thiserror::Error)]
pub enum PaypalError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// `PayPal` API returned an error.
    #[error("PayPal API error: {status} - {name}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error name.
        name: String,
        /// Error message.
        message: String,
    },
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// `PayPal` Orders API client with a cached OAuth token.
pub struct PaypalClient {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for PaypalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaypalClient")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl PaypalClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, PaypalError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token: RwLock::new(None),
        })
    }

    /// Create a `CAPTURE` order for one resource.
    ///
    /// `reference_id` identifies the resource, `custom_id` the paying user.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication or the request fails.
    pub async fn create_order(
        &self,
        amount_cents: i64,
        currency: &str,
        reference_id: &str,
        custom_id: &str,
    ) -> Result<Order, PaypalError> {
        let body = CreateOrderRequest {
            intent: "CAPTURE",
            purchase_units: vec![PurchaseUnit {
                reference_id: Some(reference_id.to_string()),
                custom_id: Some(custom_id.to_string()),
                amount: Some(Money::from_cents(amount_cents, currency)),
            }],
        };

        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        handle_response(response).await
    }

    /// Fetch an order.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication or the request fails.
    pub async fn get_order(&self, order_id: &str) -> Result<Order, PaypalError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/v2/checkout/orders/{}", self.base_url, order_id))
            .bearer_auth(token)
            .send()
            .await?;

        handle_response(response).await
    }

    /// Capture an approved order.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication or the request fails.
    pub async fn capture_order(&self, order_id: &str) -> Result<Order, PaypalError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.base_url, order_id
            ))
            .bearer_auth(token)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        handle_response(response).await
    }

    /// Current OAuth token, fetching a new one when the cached token is stale.
    async fn access_token(&self) -> Result<String, PaypalError> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Instant::now() {
                    return Ok(token.token.clone());
                }
            }
        }

        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let fresh: AccessToken = handle_response(response).await?;

        tracing::debug!(expires_in = %fresh.expires_in, "Fetched PayPal access token");

        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *self.token.write().await = Some(CachedToken {
            token: fresh.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(fresh.access_token)
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PaypalError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body: Option<PaypalErrorResponse> = response.json().await.ok();
    let (name, message) = body.map_or_else(
        || ("UNKNOWN".to_string(), format!("HTTP {status}")),
        |b| (b.name, b.message),
    );
    Err(PaypalError::Api {
        status: status.as_u16(),
        name,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "A21AA-token",
                "token_type": "Bearer",
                "expires_in": 32400
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn token_is_cached_between_calls() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/v2/checkout/orders/ORDER-1"))
            .and(header("authorization", "Bearer A21AA-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ORDER-1",
                "status": "COMPLETED",
                "purchase_units": [{"reference_id": "post:1", "custom_id": "user-1"}]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = PaypalClient::new("id", "secret", server.uri()).unwrap();
        let first = client.get_order("ORDER-1").await.unwrap();
        let second = client.get_order("ORDER-1").await.unwrap();

        assert!(first.is_completed());
        assert_eq!(
            second.primary_unit().and_then(|u| u.custom_id.as_deref()),
            Some("user-1")
        );
    }

    #[tokio::test]
    async fn create_order_sends_references() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders"))
            .and(body_partial_json(json!({
                "intent": "CAPTURE",
                "purchase_units": [{
                    "reference_id": "confession:abc",
                    "custom_id": "user-9",
                    "amount": {"currency_code": "USD", "value": "4.99"}
                }]
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"id": "ORDER-9", "status": "CREATED"})),
            )
            .mount(&server)
            .await;

        let client = PaypalClient::new("id", "secret", server.uri()).unwrap();
        let order = client
            .create_order(499, "usd", "confession:abc", "user-9")
            .await
            .unwrap();

        assert_eq!(order.id, "ORDER-9");
        assert!(!order.is_completed());
    }

    #[tokio::test]
    async fn api_error_carries_name() {
        let server = MockServer::start().await;
        mock_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders/ORDER-X/capture"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "name": "UNPROCESSABLE_ENTITY",
                "message": "The requested action could not be performed"
            })))
            .mount(&server)
            .await;

        let client = PaypalClient::new("id", "secret", server.uri()).unwrap();
        let err = client.capture_order("ORDER-X").await.unwrap_err();

        assert!(matches!(
            err,
            PaypalError::Api { status: 422, ref name, .. } if name == "UNPROCESSABLE_ENTITY"
        ));
    }
}
