//! Provider webhook endpoint.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use verifynum_signing::{HEADER_ID, HEADER_SIGNATURE, HEADER_TIMESTAMP};

use crate::error::AppError;
use crate::reconcile::{Delivery, OutcomeKind};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: OutcomeKind,
}

/// Creates the webhook router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/polar", post(handle_polar_webhook))
        .with_state(state)
}

/// Acknowledges accepted, duplicate, ignored and malformed deliveries with
/// 200. Signature failures and storage failures are non-2xx so the provider
/// retries.
async fn handle_polar_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let outcome = state
        .reconciler
        .handle_delivery(
            Delivery {
                id: header_str(&headers, HEADER_ID),
                timestamp: header_str(&headers, HEADER_TIMESTAMP),
                signature: header_str(&headers, HEADER_SIGNATURE),
                body: &body,
            },
            Utc::now().timestamp(),
        )
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Webhook delivery rejected");
            e
        })?;

    Ok(Json(WebhookAck {
        received: true,
        outcome: outcome.kind(),
    }))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
