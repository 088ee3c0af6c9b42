//! Revenue ingestion and creator invoice integration tests.

mod common;

use common::{admin_key, admin_key_value, api_key, authorization, service_key_value, TestHarness};
use fanpay_core::RoomId;
use serde_json::{json, Value};

async fn ingest(harness: &TestHarness, body: Value) -> Value {
    let response = harness
        .server
        .post("/v1/admin/revenue-events")
        .add_header(api_key(), service_key_value())
        .json(&body)
        .await;
    response.assert_status_ok();
    response.json()
}

async fn invoice(harness: &TestHarness, year: i32, month: u32) -> Value {
    let response = harness
        .server
        .get(&format!("/v1/admin/payouts/{}/invoice", harness.creator_id))
        .add_query_param("year", year)
        .add_query_param("month", month)
        .add_header(admin_key(), admin_key_value())
        .await;
    response.assert_status_ok();
    response.json()
}

// ============================================================================
// Ingestion
// ============================================================================

#[tokio::test]
async fn ingest_requires_service_key() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/admin/revenue-events")
        .json(&json!({
            "creatorId": harness.creator_id.to_string(),
            "fanId": harness.fan_id.to_string(),
            "kind": "chat_charge",
            "grossAmountCents": 100
        }))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn ingest_without_splits_uses_platform_policy() {
    let harness = TestHarness::new();

    let body = ingest(
        &harness,
        json!({
            "creatorId": harness.creator_id.to_string(),
            "fanId": harness.fan_id.to_string(),
            "kind": "chat_charge",
            "grossAmountCents": 1000,
            "occurredAt": "2026-03-10T12:00:00Z"
        }),
    )
    .await;
    assert_eq!(body["splits"], 2);

    let invoice = invoice(&harness, 2026, 3).await;
    assert_eq!(invoice["summary"]["grossCollectedCents"], 1000);
    assert_eq!(invoice["summary"]["creatorEarnedCents"], 800);
    assert_eq!(invoice["summary"]["platformEarnedCents"], 200);
}

#[tokio::test]
async fn activity_session_rejects_inverted_times() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/admin/activity-sessions")
        .add_header(api_key(), service_key_value())
        .json(&json!({
            "creatorId": harness.creator_id.to_string(),
            "startedAt": "2026-03-10T12:00:00Z",
            "endedAt": "2026-03-10T11:00:00Z"
        }))
        .await
        .assert_status_bad_request();
}

// ============================================================================
// Invoices
// ============================================================================

#[tokio::test]
async fn invoice_reconciles_month() {
    let harness = TestHarness::new();
    let room = RoomId::generate();

    harness
        .server
        .put("/v1/profile")
        .add_header(authorization(), harness.fan_auth())
        .json(&json!({ "username": "nightowl", "fullName": "Ada Owl" }))
        .await
        .assert_status_ok();

    let session = harness
        .server
        .post("/v1/admin/activity-sessions")
        .add_header(api_key(), service_key_value())
        .json(&json!({
            "roomId": room.to_string(),
            "creatorId": harness.creator_id.to_string(),
            "startedAt": "2026-03-10T12:00:00Z",
            "endedAt": "2026-03-10T12:15:00Z"
        }))
        .await;
    session.assert_status_ok();
    let session_id = session.json::<Value>()["id"].clone();

    ingest(
        &harness,
        json!({
            "creatorId": harness.creator_id.to_string(),
            "fanId": harness.fan_id.to_string(),
            "roomId": room.to_string(),
            "sessionId": session_id,
            "kind": "chat_charge",
            "grossAmountCents": 1000,
            "occurredAt": "2026-03-10T12:15:00Z",
            "splits": [
                { "beneficiary": "creator", "amountCents": 700, "splitProfile": "agency-70" },
                { "beneficiary": "platform", "amountCents": 200 },
                { "beneficiary": "agency", "amountCents": 100 }
            ]
        }),
    )
    .await;
    ingest(
        &harness,
        json!({
            "creatorId": harness.creator_id.to_string(),
            "fanId": harness.fan_id.to_string(),
            "kind": "tip",
            "grossAmountCents": 500,
            "occurredAt": "2026-03-31T23:59:59Z",
            "splits": [{ "beneficiary": "creator", "amountCents": 500 }]
        }),
    )
    .await;
    // Falls in April.
    ingest(
        &harness,
        json!({
            "creatorId": harness.creator_id.to_string(),
            "fanId": harness.fan_id.to_string(),
            "kind": "tip",
            "grossAmountCents": 900,
            "occurredAt": "2026-04-01T00:00:00Z"
        }),
    )
    .await;

    let invoice = invoice(&harness, 2026, 3).await;

    assert_eq!(invoice["periodStart"], "2026-03-01T00:00:00Z");
    assert_eq!(invoice["periodEnd"], "2026-04-01T00:00:00Z");
    let summary = &invoice["summary"];
    assert_eq!(summary["eventsCount"], 2);
    assert_eq!(summary["grossCollectedCents"], 1500);
    assert_eq!(summary["creatorEarnedCents"], 1200);
    assert_eq!(summary["platformEarnedCents"], 200);
    assert_eq!(summary["lastEventAt"], "2026-03-31T23:59:59Z");

    let lines = invoice["lines"].as_array().unwrap();
    assert_eq!(lines[0]["kind"], "tip");
    let chat = &lines[1];
    assert_eq!(chat["splitProfile"], "agency-70");
    assert_eq!(chat["fanUsername"], "nightowl");
    assert_eq!(chat["fanFullName"], "Ada Owl");
    assert_eq!(chat["sessionDurationSeconds"], 900);
}

#[tokio::test]
async fn empty_month_has_zero_summary() {
    let harness = TestHarness::new();

    let invoice = invoice(&harness, 2026, 12).await;

    assert_eq!(invoice["periodEnd"], "2027-01-01T00:00:00Z");
    assert_eq!(invoice["summary"]["eventsCount"], 0);
    assert_eq!(invoice["summary"]["grossCollectedCents"], 0);
    assert!(invoice["summary"]["lastEventAt"].is_null());
    assert!(invoice["lines"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn invoice_requires_year_and_month() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get(&format!("/v1/admin/payouts/{}/invoice", harness.creator_id))
        .add_query_param("year", 2026)
        .add_header(admin_key(), admin_key_value())
        .await;

    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["code"], "missing_params");
}

#[tokio::test]
async fn invoice_rejects_month_thirteen() {
    let harness = TestHarness::new();

    harness
        .server
        .get(&format!("/v1/admin/payouts/{}/invoice", harness.creator_id))
        .add_query_param("year", 2026)
        .add_query_param("month", 13)
        .add_header(admin_key(), admin_key_value())
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn invoice_rejects_year_past_calendar_range() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get(&format!("/v1/admin/payouts/{}/invoice", harness.creator_id))
        .add_query_param("year", i32::MAX)
        .add_query_param("month", 12)
        .add_header(admin_key(), admin_key_value())
        .await;

    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["code"], "invalid_input");
}

#[tokio::test]
async fn invoice_requires_admin_key() {
    let harness = TestHarness::new();

    harness
        .server
        .get(&format!("/v1/admin/payouts/{}/invoice", harness.creator_id))
        .add_query_param("year", 2026)
        .add_query_param("month", 3)
        .add_header(authorization(), harness.creator_auth())
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn wallet_activity_shows_up_on_invoice() {
    let harness = TestHarness::new();
    harness.fund(harness.fan_id, 1000).await;
    let id = harness.post_resource("post", None, 500).await;

    harness
        .server
        .post(&format!("/v1/posts/{id}/unlock"))
        .add_header(authorization(), harness.fan_auth())
        .json(&json!({ "paymentMethod": "wallet" }))
        .await
        .assert_status_ok();

    let now = chrono::Utc::now();
    let invoice = invoice(&harness, chrono::Datelike::year(&now), chrono::Datelike::month(&now)).await;

    assert_eq!(invoice["summary"]["eventsCount"], 1);
    assert_eq!(invoice["lines"][0]["kind"], "unlock");
    assert_eq!(invoice["summary"]["creatorEarnedCents"], 400);
    assert_eq!(invoice["summary"]["platformEarnedCents"], 100);
}
