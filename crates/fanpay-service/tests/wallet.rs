//! Wallet, top-up, tip and profile integration tests.

mod common;

use common::{admin_key, admin_key_value, authorization, TestHarness};
use fanpay_core::{RoomId, UserId};
use serde_json::{json, Value};

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn health_is_public() {
    let harness = TestHarness::new();

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "ok");
}

// ============================================================================
// Wallet
// ============================================================================

#[tokio::test]
async fn new_wallet_is_empty() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/wallet")
        .add_header(authorization(), harness.fan_auth())
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["userId"], harness.fan_id.to_string());
    assert_eq!(body["balanceCents"], 0);
    assert_eq!(body["balanceFormatted"], "0.00");
}

#[tokio::test]
async fn wallet_requires_auth() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/v1/wallet")
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn wallet_rejects_token_signed_with_other_secret() {
    let harness = TestHarness::new();
    let forged = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &json!({
            "sub": harness.fan_id.to_string(),
            "iss": common::ISSUER,
            "exp": chrono::Utc::now().timestamp() + 3600
        }),
        &jsonwebtoken::EncodingKey::from_secret(b"someone-else"),
    )
    .unwrap();

    harness
        .server
        .get("/v1/wallet")
        .add_header(
            authorization(),
            format!("Bearer {forged}").parse::<axum::http::HeaderValue>().unwrap(),
        )
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn users_are_rejected_without_jwt_secret() {
    let harness = TestHarness::with_config(|config| config.auth_jwt_secret = None);

    harness
        .server
        .get("/v1/wallet")
        .add_header(authorization(), harness.fan_auth())
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn top_up_credits_wallet_and_ledger() {
    let harness = TestHarness::new();
    harness.fund(harness.fan_id, 2500).await;

    assert_eq!(harness.balance(harness.fan_id).await, 2500);

    let response = harness
        .server
        .get("/v1/wallet/transactions")
        .add_header(authorization(), harness.fan_auth())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["amountCents"], 2500);
    assert_eq!(body["hasMore"], false);
}

#[tokio::test]
async fn transactions_paginate() {
    let harness = TestHarness::new();
    for _ in 0..3 {
        harness.fund(harness.fan_id, 100).await;
    }

    let response = harness
        .server
        .get("/v1/wallet/transactions")
        .add_query_param("limit", 2)
        .add_header(authorization(), harness.fan_auth())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["transactions"].as_array().unwrap().len(), 2);
    assert_eq!(body["hasMore"], true);
}

#[tokio::test]
async fn top_up_requires_admin_key() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/v1/admin/wallets/top-up")
        .add_header(admin_key(), "wrong-key".parse::<axum::http::HeaderValue>().unwrap())
        .json(&json!({
            "userId": harness.fan_id.to_string(),
            "amountCents": 100,
            "reason": "nope"
        }))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn top_up_rejects_non_positive_amount() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/admin/wallets/top-up")
        .add_header(admin_key(), admin_key_value())
        .json(&json!({
            "userId": harness.fan_id.to_string(),
            "amountCents": 0,
            "reason": "zero"
        }))
        .await;

    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["code"], "invalid_input");
}

// ============================================================================
// Tips
// ============================================================================

#[tokio::test]
async fn tip_moves_money_to_creator() {
    let harness = TestHarness::new();
    harness.fund(harness.fan_id, 1000).await;
    let room = RoomId::generate();

    let response = harness
        .server
        .post(&format!("/v1/rooms/{room}/tips"))
        .add_header(authorization(), harness.fan_auth())
        .json(&json!({
            "creatorId": harness.creator_id.to_string(),
            "amountCents": 300,
            "message": "great stream"
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["balanceCents"], 700);
    assert_eq!(harness.balance(harness.creator_id).await, 300);
}

#[tokio::test]
async fn tip_over_balance_is_insufficient_funds() {
    let harness = TestHarness::new();
    harness.fund(harness.fan_id, 100).await;
    let room = RoomId::generate();

    let response = harness
        .server
        .post(&format!("/v1/rooms/{room}/tips"))
        .add_header(authorization(), harness.fan_auth())
        .json(&json!({
            "creatorId": harness.creator_id.to_string(),
            "amountCents": 500
        }))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["code"], "insufficient_funds");
    assert_eq!(body["details"]["balance"], 100);
    assert_eq!(body["details"]["required"], 500);
    assert_eq!(harness.balance(harness.fan_id).await, 100);
}

#[tokio::test]
async fn cannot_tip_yourself() {
    let harness = TestHarness::new();
    harness.fund(harness.fan_id, 100).await;
    let room = RoomId::generate();

    harness
        .server
        .post(&format!("/v1/rooms/{room}/tips"))
        .add_header(authorization(), harness.fan_auth())
        .json(&json!({
            "creatorId": harness.fan_id.to_string(),
            "amountCents": 50
        }))
        .await
        .assert_status_bad_request();
}

// ============================================================================
// Profile
// ============================================================================

#[tokio::test]
async fn profile_is_saved() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .put("/v1/profile")
        .add_header(authorization(), harness.fan_auth())
        .json(&json!({ "username": "nightowl", "fullName": "  Ada Owl " }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["username"], "nightowl");
    assert_eq!(body["fullName"], "Ada Owl");
}

#[tokio::test]
async fn profile_rejects_blank_username() {
    let harness = TestHarness::new();

    harness
        .server
        .put("/v1/profile")
        .add_header(authorization(), TestHarness::bearer(UserId::generate()))
        .json(&json!({ "username": "  " }))
        .await
        .assert_status_bad_request();
}
