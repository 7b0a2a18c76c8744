//! Shared fixtures for router-level tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower::ServiceExt;
use verifynum_server::models::{BalanceTransaction, NewBalanceTransaction, ProcessedCheckout};
use verifynum_server::provider::{
    CheckoutSession, CheckoutStatus, CreatedCheckout, NewCheckout, PaymentProvider, ProviderError,
};
use verifynum_server::store::{BalanceChange, BalanceStore, CreditOutcome, StoreError};
use verifynum_server::{create_router, AppState, Config};
use verifynum_signing::{sign_payload, WebhookSecret};

pub const WEBHOOK_SECRET: &str = "whsec_dGVzdC13ZWJob29rLXNlY3JldC1rZXk=";
pub const ADMIN_TOKEN: &str = "admin-test-token";

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("POLAR_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ("POLAR_PRODUCT_ID", "prod_test"),
        ("POLAR_PRICE_ID", "price_test"),
        ("ADMIN_API_TOKEN", ADMIN_TOKEN),
        ("PUBLIC_APP_URL", "http://localhost:3001"),
    ]);
    Config::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
        .expect("test config is valid")
}

pub fn app(store: Arc<dyn BalanceStore>, provider: Option<Arc<dyn PaymentProvider>>) -> Router {
    app_with_config(&test_config(), store, provider)
}

pub fn app_with_config(
    config: &Config,
    store: Arc<dyn BalanceStore>,
    provider: Option<Arc<dyn PaymentProvider>>,
) -> Router {
    let state = AppState::new(config, store, provider).expect("valid webhook secret");
    create_router(state)
}

/// In-memory stand-in for the hosted checkout provider.
#[derive(Default)]
pub struct FakeProvider {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    created: AtomicU32,
}

impl FakeProvider {
    pub fn set_status(&self, checkout_id: &str, status: CheckoutStatus) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(checkout_id) {
            session.status = status;
        }
    }

    pub fn insert(&self, session: CheckoutSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    pub fn session(&self, checkout_id: &str) -> Option<CheckoutSession> {
        self.sessions.lock().unwrap().get(checkout_id).cloned()
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_checkout(
        &self,
        request: &NewCheckout,
    ) -> Result<CreatedCheckout, ProviderError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("chk_{}", n);
        self.insert(CheckoutSession {
            id: id.clone(),
            status: CheckoutStatus::Open,
            metadata: request.metadata.to_map(),
        });
        Ok(CreatedCheckout {
            url: format!("https://sandbox.polar.test/checkout/{}", id),
            id,
        })
    }

    async fn create_checkout_fallback(
        &self,
        request: &NewCheckout,
    ) -> Result<CreatedCheckout, ProviderError> {
        self.create_checkout(request).await
    }

    async fn get_checkout(&self, checkout_id: &str) -> Result<CheckoutSession, ProviderError> {
        self.session(checkout_id)
            .ok_or_else(|| ProviderError::NotFound(checkout_id.to_string()))
    }
}

/// Store whose writes always fail; reads report an empty ledger.
pub struct FailingStore {
    changes: broadcast::Sender<BalanceChange>,
}

impl FailingStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(4);
        Self { changes }
    }
}

#[async_trait]
impl BalanceStore for FailingStore {
    async fn get_balance(&self, _user_id: &str) -> Result<BigDecimal, StoreError> {
        Ok(BigDecimal::from(0))
    }

    async fn apply_credit(
        &self,
        _credit: NewBalanceTransaction,
    ) -> Result<CreditOutcome, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn processed_checkout(
        &self,
        _checkout_id: &str,
    ) -> Result<Option<ProcessedCheckout>, StoreError> {
        Ok(None)
    }

    async fn transactions(&self, _user_id: &str) -> Result<Vec<BalanceTransaction>, StoreError> {
        Ok(Vec::new())
    }

    fn subscribe(&self) -> broadcast::Receiver<BalanceChange> {
        self.changes.subscribe()
    }
}

/// `order.paid` event for a $15 package (10% bonus).
pub fn order_paid(checkout_id: &str, user_id: &str) -> Value {
    json!({
        "type": "order.paid",
        "data": {
            "id": format!("ord_{}", checkout_id),
            "checkout_id": checkout_id,
            "status": "paid",
            "metadata": {
                "userId": user_id,
                "amount": "15",
                "bonusPercent": "10",
                "bonusAmount": "1.50",
                "totalCredits": "16.50",
                "packageId": "balance_15"
            }
        }
    })
}

/// Builds a webhook delivery signed with the test secret.
pub fn signed_webhook(event: &Value) -> Request<Body> {
    let body = event.to_string();
    let secret = WebhookSecret::parse(WEBHOOK_SECRET).unwrap();
    let timestamp = Utc::now().timestamp();
    let msg_id = format!("msg_{}", uuid::Uuid::new_v4().simple());
    let signature = sign_payload(&secret, &msg_id, timestamp, body.as_bytes()).unwrap();

    Request::builder()
        .method("POST")
        .uri("/api/v1/webhook/polar")
        .header("content-type", "application/json")
        .header("webhook-id", msg_id)
        .header("webhook-timestamp", timestamp.to_string())
        .header("webhook-signature", signature)
        .body(Body::from(body))
        .unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Sends a request and returns status plus parsed JSON body.
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    (status, value)
}

pub fn dec(value: &Value) -> BigDecimal {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    text.parse().expect("decimal value")
}
