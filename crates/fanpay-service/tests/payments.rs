//! Stripe, `PayPal` and webhook integration tests against mocked providers.

mod common;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use common::{authorization, TestHarness, WEBHOOK_SECRET};
use fanpay_core::RoomId;
use fanpay_service::crypto::hmac_sha256_hex;
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    harness: TestHarness,
    server: MockServer,
    room: RoomId,
    resource_id: String,
}

async fn fixture(price_cents: i64) -> Fixture {
    let server = MockServer::start().await;
    let harness = TestHarness::with_providers(&server.uri());
    let room = RoomId::generate();
    let resource_id = harness
        .post_resource("confession", Some(&room.to_string()), price_cents)
        .await;
    Fixture {
        harness,
        server,
        room,
        resource_id,
    }
}

impl Fixture {
    fn intent(&self, id: &str, status: &str, amount: i64) -> Value {
        json!({
            "id": id,
            "amount": amount,
            "amount_received": if status == "succeeded" { amount } else { 0 },
            "currency": "usd",
            "status": status,
            "client_secret": format!("{id}_secret"),
            "metadata": {
                "user_id": self.harness.fan_id.to_string(),
                "room_id": self.room.to_string(),
                "resource_type": "confession",
                "resource_id": self.resource_id
            }
        })
    }

    async fn mock_intent(&self, intent: Value) {
        let id = intent["id"].as_str().unwrap().to_string();
        Mock::given(method("GET"))
            .and(path(format!("/v1/payment_intents/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(intent))
            .mount(&self.server)
            .await;
    }

    async fn mock_paypal_token(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "A21AA-test",
                "expires_in": 32400
            })))
            .mount(&self.server)
            .await;
    }

    fn order(&self, id: &str, status: &str, value: &str) -> Value {
        json!({
            "id": id,
            "status": status,
            "purchase_units": [{
                "reference_id": format!("confession:{}", self.resource_id),
                "custom_id": self.harness.fan_id.to_string(),
                "amount": { "currency_code": "USD", "value": value }
            }]
        })
    }
}

fn sign(payload: &str) -> HeaderValue {
    let timestamp = chrono::Utc::now().timestamp();
    let signature = hmac_sha256_hex(WEBHOOK_SECRET, &format!("{timestamp}.{payload}")).unwrap();
    HeaderValue::from_str(&format!("t={timestamp},v1={signature}")).unwrap()
}

fn stripe_signature() -> HeaderName {
    HeaderName::from_static("stripe-signature")
}

// ============================================================================
// Stripe
// ============================================================================

#[tokio::test]
async fn create_intent_tags_resource_metadata() {
    let f = fixture(700).await;
    Mock::given(method("POST"))
        .and(path("/v1/payment_intents"))
        .and(body_string_contains("amount=700"))
        .and(body_string_contains("metadata%5Bresource_type%5D=confession"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(f.intent("pi_new", "requires_payment_method", 700)),
        )
        .expect(1)
        .mount(&f.server)
        .await;

    let response = f
        .harness
        .server
        .post("/v1/payments/stripe/create-intent")
        .add_header(authorization(), f.harness.fan_auth())
        .json(&json!({ "resourceType": "confession", "resourceId": f.resource_id }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["paymentIntentId"], "pi_new");
    assert_eq!(body["clientSecret"], "pi_new_secret");
}

#[tokio::test]
async fn creator_cannot_checkout_own_resource() {
    let f = fixture(700).await;

    f.harness
        .server
        .post("/v1/payments/stripe/create-intent")
        .add_header(authorization(), f.harness.creator_auth())
        .json(&json!({ "resourceType": "confession", "resourceId": f.resource_id }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn confirm_settles_paid_intent_once() {
    let f = fixture(700).await;
    f.mock_intent(f.intent("pi_paid", "succeeded", 700)).await;

    for expected_already in [false, true] {
        let response = f
            .harness
            .server
            .post("/v1/payments/stripe/confirm")
            .add_header(authorization(), f.harness.fan_auth())
            .json(&json!({ "paymentIntentId": "pi_paid", "roomId": f.room.to_string() }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["alreadyUnlocked"], expected_already);
    }

    assert_eq!(f.harness.balance(f.harness.creator_id).await, 700);
    assert_eq!(f.harness.balance(f.harness.fan_id).await, 0);
}

#[tokio::test]
async fn confirm_rejects_unpaid_intent() {
    let f = fixture(700).await;
    f.mock_intent(f.intent("pi_pending", "processing", 700)).await;

    let response = f
        .harness
        .server
        .post("/v1/payments/stripe/confirm")
        .add_header(authorization(), f.harness.fan_auth())
        .json(&json!({ "paymentIntentId": "pi_pending", "roomId": f.room.to_string() }))
        .await;

    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["code"], "payment_not_successful");
    assert_eq!(f.harness.balance(f.harness.creator_id).await, 0);
}

#[tokio::test]
async fn confirm_rejects_intent_of_another_user() {
    let f = fixture(700).await;
    f.mock_intent(f.intent("pi_theirs", "succeeded", 700)).await;

    let response = f
        .harness
        .server
        .post("/v1/payments/stripe/confirm")
        .add_header(
            authorization(),
            TestHarness::bearer(fanpay_core::UserId::generate()),
        )
        .json(&json!({ "paymentIntentId": "pi_theirs", "roomId": f.room.to_string() }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["code"], "invalid_owner");
}

#[tokio::test]
async fn confirm_rejects_other_room() {
    let f = fixture(700).await;
    f.mock_intent(f.intent("pi_room", "succeeded", 700)).await;

    f.harness
        .server
        .post("/v1/payments/stripe/confirm")
        .add_header(authorization(), f.harness.fan_auth())
        .json(&json!({ "paymentIntentId": "pi_room", "roomId": RoomId::generate().to_string() }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn confirm_rejects_short_payment() {
    let f = fixture(700).await;
    f.mock_intent(f.intent("pi_short", "succeeded", 500)).await;

    f.harness
        .server
        .post("/v1/payments/stripe/confirm")
        .add_header(authorization(), f.harness.fan_auth())
        .json(&json!({ "paymentIntentId": "pi_short", "roomId": f.room.to_string() }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn stripe_error_is_bad_gateway() {
    let f = fixture(700).await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents/pi_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "type": "invalid_request_error", "message": "No such payment_intent" }
        })))
        .mount(&f.server)
        .await;

    let response = f
        .harness
        .server
        .post("/v1/payments/stripe/confirm")
        .add_header(authorization(), f.harness.fan_auth())
        .json(&json!({ "paymentIntentId": "pi_missing", "roomId": f.room.to_string() }))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    let body = response.json::<Value>();
    assert_eq!(body["code"], "external_service_error");
    assert!(!body["error"].as_str().unwrap_or_default().contains("No such payment_intent"));
}

// ============================================================================
// Stripe webhook
// ============================================================================

#[tokio::test]
async fn webhook_settles_succeeded_intent() {
    let f = fixture(700).await;
    let payload = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": f.intent("pi_hook", "succeeded", 700) }
    })
    .to_string();

    let response = f
        .harness
        .server
        .post("/webhooks/stripe")
        .add_header(stripe_signature(), sign(&payload))
        .text(payload.clone())
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["received"], true);
    assert_eq!(f.harness.balance(f.harness.creator_id).await, 700);

    // Redelivery is harmless.
    f.harness
        .server
        .post("/webhooks/stripe")
        .add_header(stripe_signature(), sign(&payload))
        .text(payload)
        .await
        .assert_status_ok();
    assert_eq!(f.harness.balance(f.harness.creator_id).await, 700);
}

#[tokio::test]
async fn webhook_rejects_bad_signature() {
    let f = fixture(700).await;
    let payload = json!({
        "id": "evt_2",
        "type": "payment_intent.succeeded",
        "data": { "object": f.intent("pi_forged", "succeeded", 700) }
    })
    .to_string();

    f.harness
        .server
        .post("/webhooks/stripe")
        .add_header(
            stripe_signature(),
            HeaderValue::from_static("t=1700000000,v1=deadbeef"),
        )
        .text(payload)
        .await
        .assert_status_bad_request();
    assert_eq!(f.harness.balance(f.harness.creator_id).await, 0);
}

#[tokio::test]
async fn webhook_is_rejected_without_secret() {
    let harness = TestHarness::new();
    let payload = json!({ "id": "evt_3", "type": "charge.refunded", "data": { "object": {} } })
        .to_string();

    harness
        .server
        .post("/webhooks/stripe")
        .add_header(stripe_signature(), sign(&payload))
        .text(payload)
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn webhook_ignores_other_events() {
    let f = fixture(700).await;
    let payload = json!({ "id": "evt_4", "type": "charge.refunded", "data": { "object": {} } })
        .to_string();

    let response = f
        .harness
        .server
        .post("/webhooks/stripe")
        .add_header(stripe_signature(), sign(&payload))
        .text(payload)
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["received"], true);
}

// ============================================================================
// PayPal
// ============================================================================

#[tokio::test]
async fn create_order_references_resource() {
    let f = fixture(1250).await;
    f.mock_paypal_token().await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .and(body_string_contains("\"value\":\"12.50\""))
        .and(body_string_contains(&format!("confession:{}", f.resource_id)))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "ORDER-1",
            "status": "CREATED"
        })))
        .expect(1)
        .mount(&f.server)
        .await;

    let response = f
        .harness
        .server
        .post("/v1/payments/paypal/create-order")
        .add_header(authorization(), f.harness.fan_auth())
        .json(&json!({ "resourceType": "confession", "resourceId": f.resource_id }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["orderID"], "ORDER-1");
}

#[tokio::test]
async fn capture_settles_completed_order() {
    let f = fixture(1250).await;
    f.mock_paypal_token().await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/ORDER-2/capture"))
        .respond_with(ResponseTemplate::new(201).set_body_json(f.order("ORDER-2", "COMPLETED", "12.50")))
        .mount(&f.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/ORDER-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(f.order("ORDER-2", "COMPLETED", "12.50")))
        .mount(&f.server)
        .await;

    let response = f
        .harness
        .server
        .post("/v1/payments/paypal/capture-order")
        .add_header(authorization(), f.harness.fan_auth())
        .json(&json!({ "orderID": "ORDER-2" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(f.harness.balance(f.harness.creator_id).await, 1250);
}

#[tokio::test]
async fn capture_of_already_captured_order_still_unlocks() {
    let f = fixture(1250).await;
    f.mock_paypal_token().await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/ORDER-3/capture"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "name": "UNPROCESSABLE_ENTITY",
            "message": "ORDER_ALREADY_CAPTURED"
        })))
        .mount(&f.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/ORDER-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(f.order("ORDER-3", "COMPLETED", "12.50")))
        .mount(&f.server)
        .await;

    let response = f
        .harness
        .server
        .post("/v1/payments/paypal/capture-order")
        .add_header(authorization(), f.harness.fan_auth())
        .json(&json!({ "orderID": "ORDER-3" }))
        .await;

    response.assert_status_ok();
    assert_eq!(f.harness.balance(f.harness.creator_id).await, 1250);
}

#[tokio::test]
async fn capture_failure_on_open_order_is_bad_gateway() {
    let f = fixture(1250).await;
    f.mock_paypal_token().await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/ORDER-4/capture"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "name": "UNPROCESSABLE_ENTITY",
            "message": "INSTRUMENT_DECLINED"
        })))
        .mount(&f.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/ORDER-4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(f.order("ORDER-4", "APPROVED", "12.50")))
        .mount(&f.server)
        .await;

    f.harness
        .server
        .post("/v1/payments/paypal/capture-order")
        .add_header(authorization(), f.harness.fan_auth())
        .json(&json!({ "orderID": "ORDER-4" }))
        .await
        .assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(f.harness.balance(f.harness.creator_id).await, 0);
}

#[tokio::test]
async fn paypal_unlock_route_verifies_order() {
    let f = fixture(1250).await;
    f.mock_paypal_token().await;
    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/ORDER-5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(f.order("ORDER-5", "COMPLETED", "10.00")))
        .mount(&f.server)
        .await;

    let response = f
        .harness
        .server
        .post(&format!("/v1/confessions/{}/unlock", f.resource_id))
        .add_header(authorization(), f.harness.fan_auth())
        .json(&json!({ "paymentMethod": "paypal", "paymentReference": "ORDER-5" }))
        .await;

    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["code"], "payment_not_successful");
}
