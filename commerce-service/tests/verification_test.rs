mod common;

use axum::http::StatusCode;
use chrono::Duration;
use commerce_service::models::EMAILPASS_PROVIDER;
use commerce_service::services::{ActorType, TokenPurpose};
use common::{TestApp, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn test_login_blocked_until_email_verified() {
    let app = TestApp::spawn();
    app.sign_up("jane@example.com").await;

    let (status, body) = app.login("jane@example.com", PASSWORD).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["type"], "unauthorized");
    let message = body["message"].as_str().unwrap().to_lowercase();
    assert!(message.contains("verify your email"), "unexpected message: {}", message);
}

#[tokio::test]
async fn test_verification_round_trip_unlocks_login() {
    let app = TestApp::spawn();
    app.sign_up("jane@example.com").await;

    let (status, body) = app
        .post(
            "/store/customers/send-verification",
            json!({ "email": "jane@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let token = app.verification_token("jane@example.com").await;
    let (status, body) = app
        .post("/store/customers/verify-email", json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let customer = app.customer("jane@example.com").await.unwrap();
    assert_eq!(customer.metadata["email_verified"], true);
    assert_eq!(customer.metadata["email_verification_required"], false);
    assert!(customer.metadata["email_verified_at"].is_string());

    let (status, body) = app.login("jane@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    let claims = app
        .state
        .tokens
        .validate_app_token(body["token"].as_str().unwrap())
        .unwrap();
    assert_eq!(claims.actor_type, "customer");
    assert_eq!(claims.actor_id, customer.id);
}

#[tokio::test]
async fn test_login_is_case_insensitive_on_email() {
    let app = TestApp::spawn();
    app.sign_up("TestUser@example.com").await;

    app.post(
        "/store/customers/send-verification",
        json!({ "email": "TESTUSER@example.com" }),
    )
    .await;
    let token = app.verification_token("testuser@example.com").await;
    let (status, _) = app
        .post("/store/customers/verify-email", json!({ "token": token }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.login("  TestUser@Example.com ", PASSWORD).await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn test_wrong_purpose_token_is_rejected_without_changes() {
    let app = TestApp::spawn();
    app.sign_up("jane@example.com").await;
    let before = app.customer("jane@example.com").await.unwrap();

    let reset_token = app
        .state
        .tokens
        .issue_action_token(
            "jane@example.com",
            EMAILPASS_PROVIDER,
            ActorType::Customer,
            TokenPurpose::PasswordReset,
            Duration::minutes(15),
        )
        .unwrap();

    let (status, body) = app
        .post("/store/customers/verify-email", json!({ "token": reset_token }))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid verification token.");
    let after = app.customer("jane@example.com").await.unwrap();
    assert_eq!(before.metadata, after.metadata);
}

#[tokio::test]
async fn test_expired_token_is_rejected_without_changes() {
    let app = TestApp::spawn();
    app.sign_up("jane@example.com").await;

    let expired = app
        .state
        .tokens
        .issue_action_token(
            "jane@example.com",
            EMAILPASS_PROVIDER,
            ActorType::Customer,
            TokenPurpose::EmailVerification,
            Duration::hours(-1),
        )
        .unwrap();

    let (status, body) = app
        .post("/store/customers/verify-email", json!({ "token": expired }))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid or expired verification link.");
    let customer = app.customer("jane@example.com").await.unwrap();
    assert_eq!(customer.metadata["email_verified"], false);

    let (status, _) = app.login("jane@example.com", PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_email_requires_token() {
    let app = TestApp::spawn();

    let (status, body) = app.post("/store/customers/verify-email", json!({})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Verification token is required.");
}

#[tokio::test]
async fn test_verify_email_is_idempotent() {
    let app = TestApp::spawn();
    app.sign_up("jane@example.com").await;
    app.post(
        "/store/customers/send-verification",
        json!({ "email": "jane@example.com" }),
    )
    .await;
    let token = app.verification_token("jane@example.com").await;

    let (first, _) = app
        .post("/store/customers/verify-email", json!({ "token": token }))
        .await;
    let verified = app.customer("jane@example.com").await.unwrap();

    let (second, _) = app
        .post("/store/customers/verify-email", json!({ "token": token }))
        .await;
    let again = app.customer("jane@example.com").await.unwrap();

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(verified.metadata, again.metadata);
}

#[tokio::test]
async fn test_send_verification_does_not_reveal_unknown_accounts() {
    let app = TestApp::spawn();

    let (status, body) = app
        .post(
            "/store/customers/send-verification",
            json!({ "email": "nobody@example.com" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(app.email.sent_to("nobody@example.com").await.len(), 1);
}

#[tokio::test]
async fn test_send_verification_requires_an_email() {
    let app = TestApp::spawn();

    let (status, body) = app
        .post("/store/customers/send-verification", json!({ "email": "   " }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email is required to send a verification link.");
    assert!(app.email.sent().await.is_empty());
}

#[tokio::test]
async fn test_send_verification_uses_caller_identity_email() {
    let app = TestApp::spawn();
    let token = app.register("jane@example.com", PASSWORD).await;

    let (status, _) = app
        .post_with_bearer("/store/customers/send-verification", &token, json!({}))
        .await;

    assert_eq!(status, StatusCode::OK);
    let sent = app.email.sent_to("jane@example.com").await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0]
        .body_text
        .contains("http://localhost:8000/verify-email?token="));
}
