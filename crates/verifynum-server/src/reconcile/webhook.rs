//! Webhook Reconciler: the only path that credits a paid checkout.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use verifynum_signing::{verify_payload, SignatureError, WebhookHeaders, WebhookSecret};

use crate::models::{BalanceTransaction, NewBalanceTransaction};
use crate::provider::{CheckoutMetadata, OrderData, WebhookEvent};
use crate::store::{BalanceStore, CreditOutcome, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook secret is not configured")]
    NotConfigured,

    #[error("signature rejected: {0}")]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a verified delivery resulted in.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    Credited(BalanceTransaction),
    Duplicate { checkout_id: String },
    Ignored { event_type: String },
    Malformed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Credited,
    Duplicate,
    Ignored,
    Malformed,
}

impl WebhookOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            WebhookOutcome::Credited(_) => OutcomeKind::Credited,
            WebhookOutcome::Duplicate { .. } => OutcomeKind::Duplicate,
            WebhookOutcome::Ignored { .. } => OutcomeKind::Ignored,
            WebhookOutcome::Malformed { .. } => OutcomeKind::Malformed,
        }
    }
}

/// One inbound delivery, as pulled off the transport.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    pub id: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
}

pub struct WebhookReconciler {
    store: Arc<dyn BalanceStore>,
    secret: Option<WebhookSecret>,
    tolerance_secs: i64,
    store_timeout: Duration,
}

impl WebhookReconciler {
    pub fn new(
        store: Arc<dyn BalanceStore>,
        secret: Option<WebhookSecret>,
        tolerance_secs: i64,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            secret,
            tolerance_secs,
            store_timeout,
        }
    }

    /// Verifies and processes a delivery. Nothing in the body is read
    /// before the signature checks out.
    pub async fn handle_delivery(
        &self,
        delivery: Delivery<'_>,
        now: i64,
    ) -> Result<WebhookOutcome, WebhookError> {
        let secret = self.secret.as_ref().ok_or(WebhookError::NotConfigured)?;
        let headers =
            WebhookHeaders::from_parts(delivery.id, delivery.timestamp, delivery.signature)?;
        verify_payload(secret, &headers, delivery.body, now, self.tolerance_secs)?;

        let event = match WebhookEvent::parse(delivery.body) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(webhook_id = %headers.id, error = %e, "Malformed webhook payload");
                return Ok(WebhookOutcome::Malformed {
                    reason: e.to_string(),
                });
            }
        };

        tracing::info!(
            webhook_id = %headers.id,
            event_type = event.event_type(),
            "Received webhook"
        );
        Ok(self.handle_event(event).await?)
    }

    /// Dispatches an already-verified event.
    pub async fn handle_event(&self, event: WebhookEvent) -> Result<WebhookOutcome, StoreError> {
        let event_type = event.event_type().to_string();
        match event {
            WebhookEvent::OrderPaid(order) => return self.credit_order(&order).await,
            WebhookEvent::CheckoutCreated(data) | WebhookEvent::CheckoutUpdated(data) => {
                tracing::info!(
                    event_type = %event_type,
                    checkout_id = %data.id,
                    status = data.status.map(|s| s.as_str()).unwrap_or("unknown"),
                    "Checkout lifecycle event, not crediting"
                );
            }
            WebhookEvent::OrderCreated(order) => {
                tracing::info!(order_id = %order.id, "Order created, waiting for order.paid");
            }
            WebhookEvent::SubscriptionCreated(r)
            | WebhookEvent::SubscriptionUpdated(r)
            | WebhookEvent::SubscriptionCanceled(r) => {
                tracing::info!(
                    event_type = %event_type,
                    subscription_id = %r.id,
                    "Subscription event"
                );
            }
            WebhookEvent::Unknown(_) => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event type");
            }
        }
        Ok(WebhookOutcome::Ignored { event_type })
    }

    async fn credit_order(&self, order: &OrderData) -> Result<WebhookOutcome, StoreError> {
        let checkout_id = order.idempotency_key().to_string();

        let metadata = match CheckoutMetadata::from_map(&order.metadata) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::error!(
                    checkout_id = %checkout_id,
                    order_id = %order.id,
                    error = %e,
                    "Malformed order.paid metadata, not crediting"
                );
                return Ok(WebhookOutcome::Malformed {
                    reason: e.to_string(),
                });
            }
        };

        let credit = NewBalanceTransaction::topup(
            metadata.user_id,
            metadata.amount,
            metadata.bonus_amount,
            metadata.total_credits,
            checkout_id.clone(),
            metadata.package_id,
            "order.paid",
        );

        let outcome = tokio::time::timeout(self.store_timeout, self.store.apply_credit(credit))
            .await
            .map_err(|_| StoreError::Timeout(self.store_timeout))
            .and_then(|result| result)
            .map_err(|e| {
                tracing::error!(
                    checkout_id = %checkout_id,
                    error = %e,
                    "Failed to credit paid order"
                );
                e
            })?;

        match outcome {
            CreditOutcome::Applied(tx) => {
                tracing::info!(
                    checkout_id = %checkout_id,
                    user_id = %tx.user_id,
                    total_credits = %tx.total_credits,
                    previous_balance = %tx.previous_balance,
                    new_balance = %tx.new_balance,
                    transaction_id = %tx.transaction_id,
                    "Balance credited"
                );
                Ok(WebhookOutcome::Credited(tx))
            }
            CreditOutcome::AlreadyProcessed(record) => {
                tracing::info!(
                    checkout_id = %checkout_id,
                    processed_at = %record.processed_at,
                    "Duplicate webhook ignored, checkout already processed"
                );
                Ok(WebhookOutcome::Duplicate { checkout_id })
            }
        }
    }
}
