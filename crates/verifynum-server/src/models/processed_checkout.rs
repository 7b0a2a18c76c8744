//! Idempotency record proving a checkout has been credited.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Permanent marker written in the same atomic unit as the credit it
/// guards. At most one exists per `checkout_id`; records are never pruned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedCheckout {
    pub checkout_id: String,
    pub processed_at: DateTime<Utc>,
    /// Webhook event that triggered the credit (e.g. `order.paid`).
    pub event_type: String,
    pub user_id: String,
    pub total_credits: BigDecimal,
    /// The balance transaction created alongside this record.
    pub transaction_id: Uuid,
}
