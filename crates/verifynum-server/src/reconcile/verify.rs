//! Synchronous Verifier: reports checkout status and whether the credit
//! has landed. Read-only by construction.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use super::messages::{status_message, Locale};
use crate::models::CUSTOM_PACKAGE_ID;
use crate::provider::metadata::{decimal_field, metadata_user_id};
use crate::provider::{CheckoutStatus, PaymentProvider, ProviderError};
use crate::store::{IdempotencyLedger, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("checkoutId is required")]
    MissingCheckoutId,

    #[error("userId is required")]
    MissingUserId,

    #[error("checkout belongs to another user")]
    Unauthorized,

    #[error("checkout not found: {0}")]
    NotFound(String),

    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub status: CheckoutStatus,
    /// Set for expired or failed checkouts: stop waiting.
    pub terminal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonus_amount: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_credits: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_updated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub struct SyncVerifier {
    provider: Option<Arc<dyn PaymentProvider>>,
    ledger: IdempotencyLedger,
}

impl SyncVerifier {
    pub fn new(provider: Option<Arc<dyn PaymentProvider>>, ledger: IdempotencyLedger) -> Self {
        Self { provider, ledger }
    }

    pub async fn verify(
        &self,
        checkout_id: &str,
        user_id: &str,
        locale: Locale,
    ) -> Result<VerifyResponse, VerifyError> {
        let checkout_id = checkout_id.trim();
        let user_id = user_id.trim();
        if checkout_id.is_empty() {
            return Err(VerifyError::MissingCheckoutId);
        }
        if user_id.is_empty() {
            return Err(VerifyError::MissingUserId);
        }

        let provider = self.provider.as_ref().ok_or_else(|| {
            VerifyError::ProviderUnavailable("payment provider not configured".to_string())
        })?;

        let checkout = provider.get_checkout(checkout_id).await.map_err(|e| match e {
            ProviderError::NotFound(id) => VerifyError::NotFound(id),
            other => {
                tracing::error!(checkout_id, error = %other, "Failed to fetch checkout status");
                VerifyError::ProviderUnavailable(other.to_string())
            }
        })?;

        if let Some(owner) = metadata_user_id(&checkout.metadata) {
            if owner != user_id {
                tracing::warn!(
                    checkout_id,
                    requested_user_id = user_id,
                    metadata_user_id = %owner,
                    "Verify rejected: userId mismatch"
                );
                return Err(VerifyError::Unauthorized);
            }
        }

        if !checkout.status.is_paid() {
            tracing::debug!(checkout_id, status = checkout.status.as_str(), "Checkout not paid");
            return Ok(VerifyResponse {
                success: false,
                status: checkout.status,
                terminal: checkout.status.is_terminal_failure(),
                amount: None,
                bonus_amount: None,
                total_credits: None,
                package_id: None,
                balance_updated: None,
                message: Some(status_message(checkout.status, locale).to_string()),
            });
        }

        let balance_updated = self.ledger.has_processed(checkout_id).await?;

        // Display only; unparsable values are reported as zero.
        let amount_of = |field| {
            decimal_field(&checkout.metadata, field)
                .ok()
                .flatten()
                .unwrap_or_else(|| BigDecimal::from(0))
        };
        let package_id = checkout
            .metadata
            .get("packageId")
            .and_then(|v| v.as_str())
            .unwrap_or(CUSTOM_PACKAGE_ID)
            .to_string();

        tracing::info!(
            checkout_id,
            user_id,
            status = checkout.status.as_str(),
            balance_updated,
            "Checkout verified"
        );

        Ok(VerifyResponse {
            success: true,
            status: checkout.status,
            terminal: false,
            amount: Some(amount_of("amount")),
            bonus_amount: Some(amount_of("bonusAmount")),
            total_credits: Some(amount_of("totalCredits")),
            package_id: Some(package_id),
            balance_updated: Some(balance_updated),
            message: None,
        })
    }
}
