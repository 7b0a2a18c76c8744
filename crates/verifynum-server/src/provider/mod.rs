//! Checkout provider contract and shared types.

pub mod events;
pub mod metadata;
pub mod polar;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use events::{CheckoutEventData, OrderData, ResourceRef, WebhookEvent};
pub use metadata::{CheckoutMetadata, MetadataError};
pub use polar::PolarClient;

/// Provider-side checkout lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Open,
    Confirmed,
    Succeeded,
    Expired,
    Failed,
    #[serde(other)]
    Unknown,
}

impl CheckoutStatus {
    /// Payment has been taken.
    pub fn is_paid(self) -> bool {
        matches!(self, CheckoutStatus::Succeeded | CheckoutStatus::Confirmed)
    }

    /// The checkout can never become paid.
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, CheckoutStatus::Expired | CheckoutStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckoutStatus::Open => "open",
            CheckoutStatus::Confirmed => "confirmed",
            CheckoutStatus::Succeeded => "succeeded",
            CheckoutStatus::Expired => "expired",
            CheckoutStatus::Failed => "failed",
            CheckoutStatus::Unknown => "unknown",
        }
    }
}

/// Everything needed to open a hosted checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCheckout {
    pub product_id: Option<String>,
    pub price_id: Option<String>,
    pub success_url: String,
    pub customer_email: Option<String>,
    /// Charge in minor units (cents).
    pub amount_cents: i64,
    pub metadata: CheckoutMetadata,
}

/// A checkout the provider has created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedCheckout {
    pub id: String,
    pub url: String,
}

/// A checkout as reported by the provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub status: CheckoutStatus,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Checkout not found: {0}")]
    NotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),
}

/// Remote checkout provider.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Opens a checkout through the primary API.
    async fn create_checkout(
        &self,
        request: &NewCheckout,
    ) -> Result<CreatedCheckout, ProviderError>;

    /// Secondary creation path tried once when the primary fails. Same
    /// payload, different endpoint.
    async fn create_checkout_fallback(
        &self,
        request: &NewCheckout,
    ) -> Result<CreatedCheckout, ProviderError>;

    /// Fetches current checkout state.
    async fn get_checkout(&self, checkout_id: &str) -> Result<CheckoutSession, ProviderError>;
}
