//! Webhook endpoint behavior under bad signatures, storage failures and
//! concurrent redelivery.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{body::Body, http::Request, http::StatusCode};
use bigdecimal::BigDecimal;
use chrono::Utc;
use common::*;
use serde_json::json;
use verifynum_server::store::{BalanceStore, MemoryBalanceStore};
use verifynum_server::Config;
use verifynum_signing::{sign_payload, WebhookSecret};

#[tokio::test]
async fn test_wrong_signature_is_401_and_not_credited() {
    let store = Arc::new(MemoryBalanceStore::new());
    let app = app(store.clone(), None);

    let body = order_paid("chk_1", "uid_1").to_string();
    let timestamp = Utc::now().timestamp();
    let other_secret = WebhookSecret::parse("some-other-secret").unwrap();
    let signature = sign_payload(&other_secret, "msg_1", timestamp, body.as_bytes()).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/webhook/polar")
        .header("webhook-id", "msg_1")
        .header("webhook-timestamp", timestamp.to_string())
        .header("webhook-signature", signature)
        .body(Body::from(body))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!store.has_processed("chk_1").await.unwrap());
}

#[tokio::test]
async fn test_unsigned_and_stale_deliveries_rejected() {
    let store = Arc::new(MemoryBalanceStore::new());
    let app = app(store.clone(), None);

    let (status, _) = send(
        &app,
        post_json("/api/v1/webhook/polar", order_paid("chk_1", "uid_1")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let body = order_paid("chk_1", "uid_1").to_string();
    let stale = Utc::now().timestamp() - 3600;
    let secret = WebhookSecret::parse(WEBHOOK_SECRET).unwrap();
    let signature = sign_payload(&secret, "msg_old", stale, body.as_bytes()).unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/webhook/polar")
        .header("webhook-id", "msg_old")
        .header("webhook-timestamp", stale.to_string())
        .header("webhook-signature", signature)
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(store.get_balance("uid_1").await.unwrap(), BigDecimal::from(0));
}

#[tokio::test]
async fn test_storage_failure_is_500_so_provider_retries() {
    let app = app(Arc::new(FailingStore::new()), None);
    let (status, body) = send(&app, signed_webhook(&order_paid("chk_1", "uid_1"))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("Internal server error"));
}

#[tokio::test]
async fn test_missing_secret_is_503() {
    let config = Config::from_lookup(|_| None).unwrap();
    let app = app_with_config(&config, Arc::new(MemoryBalanceStore::new()), None);
    let (status, _) = send(&app, signed_webhook(&order_paid("chk_1", "uid_1"))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_malformed_and_ignored_events_acknowledged() {
    let store = Arc::new(MemoryBalanceStore::new());
    let app = app(store.clone(), None);

    let mut no_user = order_paid("chk_1", "uid_1");
    no_user["data"]["metadata"]["userId"] = json!(null);
    let (status, body) = send(&app, signed_webhook(&no_user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], json!("malformed"));

    let created = json!({"type": "checkout.created", "data": {"id": "chk_1", "status": "open"}});
    let (status, body) = send(&app, signed_webhook(&created)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], json!("ignored"));

    let future = json!({"type": "customer.state_changed", "data": {"id": "cus_1"}});
    let (status, body) = send(&app, signed_webhook(&future)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], json!("ignored"));

    assert!(!store.has_processed("chk_1").await.unwrap());
}

/// The provider may deliver the same event many times at once.
#[tokio::test]
async fn test_concurrent_deliveries_credit_once() {
    let store = Arc::new(MemoryBalanceStore::new());
    let app = app(store.clone(), None);
    let event = order_paid("chk_storm", "uid_storm");

    let mut handles = Vec::new();
    for _ in 0..20 {
        let app = app.clone();
        let event = event.clone();
        handles.push(tokio::spawn(async move { send(&app, signed_webhook(&event)).await }));
    }

    let mut outcomes: HashMap<String, usize> = HashMap::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        *outcomes
            .entry(body["outcome"].as_str().unwrap().to_string())
            .or_default() += 1;
    }

    assert_eq!(outcomes.get("credited"), Some(&1));
    assert_eq!(outcomes.get("duplicate"), Some(&19));
    assert_eq!(
        store.get_balance("uid_storm").await.unwrap(),
        "16.50".parse::<BigDecimal>().unwrap()
    );
    assert_eq!(store.transactions("uid_storm").await.unwrap().len(), 1);
}

/// Numbers in metadata are accepted as well as strings.
#[tokio::test]
async fn test_numeric_metadata() {
    let store = Arc::new(MemoryBalanceStore::new());
    let app = app(store.clone(), None);

    let mut event = order_paid("chk_num", "uid_num");
    event["data"]["metadata"]["amount"] = json!(30);
    event["data"]["metadata"]["bonusAmount"] = json!(4.5);
    event["data"]["metadata"]["totalCredits"] = json!(34.5);

    let (status, body) = send(&app, signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], json!("credited"));
    assert_eq!(
        store.get_balance("uid_num").await.unwrap(),
        "34.5".parse::<BigDecimal>().unwrap()
    );
}
