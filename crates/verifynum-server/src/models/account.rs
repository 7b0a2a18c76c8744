//! Account model holding a user's spendable balance.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user's balance document.
///
/// Accounts are created lazily on first credit and never deleted. The
/// balance is only ever written by the store's atomic credit path.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Identifier issued by the identity provider.
    pub user_id: String,
    /// Current spendable balance.
    pub balance: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// A fresh account with zero balance.
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            balance: BigDecimal::from(0),
            created_at: now,
            updated_at: now,
        }
    }
}
