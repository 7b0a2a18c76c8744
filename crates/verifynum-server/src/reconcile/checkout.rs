//! Checkout Initiator: turns a package or custom amount into a hosted
//! checkout carrying the intended credit as metadata.

use std::sync::Arc;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::models::{
    decimal_places, find_package, is_bounded_amount, CreditQuote, CUSTOM_PACKAGE_ID,
};
use crate::provider::{CheckoutMetadata, NewCheckout, PaymentProvider};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CheckoutError {
    #[error("userId is required")]
    MissingUserId,

    #[error("either packageId or customAmount is required")]
    MissingSelection,

    #[error("packageId and customAmount are mutually exclusive")]
    AmbiguousSelection,

    #[error("unknown package: {0}")]
    UnknownPackage(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Static inputs to checkout creation.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub public_app_url: String,
    pub product_id: Option<String>,
    pub price_id: Option<String>,
    pub min_custom_amount: BigDecimal,
    pub max_custom_amount: BigDecimal,
}

#[derive(Debug, Clone, Default)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub email: Option<String>,
    pub package_id: Option<String>,
    pub custom_amount: Option<BigDecimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub checkout_id: String,
    pub amount: BigDecimal,
    pub bonus_percent: u32,
    pub bonus_amount: BigDecimal,
    pub total_credits: BigDecimal,
    pub package_id: String,
    pub is_dev: bool,
}

pub struct CheckoutInitiator {
    provider: Option<Arc<dyn PaymentProvider>>,
    settings: CheckoutSettings,
}

impl CheckoutInitiator {
    /// With no provider the initiator runs in development mode and
    /// synthesizes checkouts locally.
    pub fn new(provider: Option<Arc<dyn PaymentProvider>>, settings: CheckoutSettings) -> Self {
        Self { provider, settings }
    }

    pub fn is_dev(&self) -> bool {
        self.provider.is_none()
    }

    pub fn min_custom_amount(&self) -> &BigDecimal {
        &self.settings.min_custom_amount
    }

    /// Resolves the selection into the credit it buys and its package id.
    pub fn quote(&self, request: &CheckoutRequest) -> Result<(CreditQuote, String), CheckoutError> {
        match (&request.package_id, &request.custom_amount) {
            (Some(_), Some(_)) => Err(CheckoutError::AmbiguousSelection),
            (None, None) => Err(CheckoutError::MissingSelection),
            (Some(package_id), None) => find_package(package_id)
                .map(|p| (p.quote, p.id.to_string()))
                .ok_or_else(|| CheckoutError::UnknownPackage(package_id.clone())),
            (None, Some(amount)) => {
                self.check_custom_amount(amount)?;
                Ok((
                    CreditQuote::for_amount(amount.clone()),
                    CUSTOM_PACKAGE_ID.to_string(),
                ))
            }
        }
    }

    fn check_custom_amount(&self, amount: &BigDecimal) -> Result<(), CheckoutError> {
        if !is_bounded_amount(amount) {
            return Err(CheckoutError::InvalidAmount(
                "amount is out of range".to_string(),
            ));
        }
        if amount <= &BigDecimal::from(0) {
            return Err(CheckoutError::InvalidAmount(format!(
                "{} must be positive",
                amount
            )));
        }
        if amount < &self.settings.min_custom_amount {
            return Err(CheckoutError::InvalidAmount(format!(
                "minimum is {}",
                self.settings.min_custom_amount
            )));
        }
        if amount > &self.settings.max_custom_amount {
            return Err(CheckoutError::InvalidAmount(format!(
                "maximum is {}",
                self.settings.max_custom_amount
            )));
        }
        if decimal_places(amount) > 2 {
            return Err(CheckoutError::InvalidAmount(format!(
                "{} has more than two decimal places",
                amount
            )));
        }
        Ok(())
    }

    /// Opens a checkout. Never touches balances.
    pub async fn create(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, CheckoutError> {
        let user_id = request.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(CheckoutError::MissingUserId);
        }
        let (quote, package_id) = self.quote(&request)?;

        let Some(provider) = &self.provider else {
            tracing::info!(
                user_id = %user_id,
                "No payment provider configured, creating dev checkout"
            );
            return self.dev_checkout(&user_id, quote, package_id);
        };

        let amount_cents = (&quote.amount * BigDecimal::from(100))
            .with_scale(0)
            .to_i64()
            .ok_or_else(|| CheckoutError::InvalidAmount(quote.amount.to_string()))?;

        let new_checkout = NewCheckout {
            product_id: self.settings.product_id.clone(),
            price_id: self.settings.price_id.clone(),
            success_url: format!(
                "{}/topup/success?checkout_id={{CHECKOUT_ID}}",
                self.base_url()
            ),
            customer_email: request.email.filter(|e| !e.trim().is_empty()),
            amount_cents,
            metadata: CheckoutMetadata::new(user_id.clone(), &quote, package_id.clone()),
        };

        let created = match provider.create_checkout(&new_checkout).await {
            Ok(created) => created,
            Err(primary) => {
                tracing::warn!(
                    error = %primary,
                    user_id = %user_id,
                    "Checkout creation failed, trying fallback"
                );
                provider
                    .create_checkout_fallback(&new_checkout)
                    .await
                    .map_err(|fallback| {
                        tracing::error!(
                            primary = %primary,
                            fallback = %fallback,
                            user_id = %user_id,
                            "Checkout creation failed on both paths"
                        );
                        CheckoutError::ProviderUnavailable(fallback.to_string())
                    })?
            }
        };

        tracing::info!(
            checkout_id = %created.id,
            user_id = %user_id,
            package_id = %package_id,
            total_credits = %quote.total_credits,
            "Checkout created"
        );

        Ok(CheckoutResponse {
            checkout_url: created.url,
            checkout_id: created.id,
            amount: quote.amount,
            bonus_percent: quote.bonus_percent,
            bonus_amount: quote.bonus_amount,
            total_credits: quote.total_credits,
            package_id,
            is_dev: false,
        })
    }

    fn base_url(&self) -> &str {
        self.settings.public_app_url.trim_end_matches('/')
    }

    fn dev_checkout(
        &self,
        user_id: &str,
        quote: CreditQuote,
        package_id: String,
    ) -> Result<CheckoutResponse, CheckoutError> {
        let amount = quote.amount.to_string();
        let bonus = quote.bonus_amount.to_string();
        let total = quote.total_credits.to_string();
        let url = Url::parse_with_params(
            &format!("{}/topup/success", self.base_url()),
            [
                ("amount", amount.as_str()),
                ("bonus", bonus.as_str()),
                ("total", total.as_str()),
                ("userId", user_id),
                ("dev", "true"),
            ],
        )
        .map_err(|e| CheckoutError::ProviderUnavailable(format!("invalid PUBLIC_APP_URL: {}", e)))?;

        Ok(CheckoutResponse {
            checkout_url: url.to_string(),
            checkout_id: format!("dev_{}", Utc::now().timestamp_millis()),
            amount: quote.amount,
            bonus_percent: quote.bonus_percent,
            bonus_amount: quote.bonus_amount,
            total_credits: quote.total_credits,
            package_id,
            is_dev: true,
        })
    }
}
