//! Checkout creation, package catalogue and verification endpoints.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parse_amount;
use crate::error::AppError;
use crate::models::{packages, BalancePackage};
use crate::reconcile::{
    CheckoutRequest, CheckoutResponse, FailureMessage, Locale, PaymentFailureReason,
    VerifyResponse,
};
use crate::state::AppState;

/// Request body for opening a checkout.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub package_id: Option<String>,
    /// Number or decimal string.
    #[serde(default)]
    pub custom_amount: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCheckoutRequest {
    #[serde(default)]
    pub checkout_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub locale: Option<Locale>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagesResponse {
    pub packages: Vec<BalancePackage>,
    pub min_custom_amount: BigDecimal,
}

/// Query of the failed-payment redirect. Accepts the provider's
/// snake_case names as well.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureQuery {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, alias = "error_code")]
    pub error_code: Option<String>,
    #[serde(default, alias = "checkout_id")]
    pub checkout_id: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub locale: Option<Locale>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureResponse {
    pub reason: PaymentFailureReason,
    #[serde(flatten)]
    pub message: FailureMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<BigDecimal>,
}

/// Creates the checkout router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/checkout/packages", get(list_packages))
        .route("/checkout/verify", post(verify_checkout))
        .route("/checkout/failure", get(describe_failure))
        .with_state(state)
}

async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let custom_amount = match req.custom_amount {
        None | Some(Value::Null) => None,
        Some(value) => Some(parse_amount("customAmount", &value)?),
    };

    let response = state
        .checkout
        .create(CheckoutRequest {
            user_id: req.user_id.unwrap_or_default(),
            email: req.email,
            package_id: req.package_id.filter(|p| !p.is_empty()),
            custom_amount,
        })
        .await?;

    Ok(Json(response))
}

async fn list_packages(State(state): State<AppState>) -> Json<PackagesResponse> {
    Json(PackagesResponse {
        packages: packages(),
        min_custom_amount: state.checkout.min_custom_amount().clone(),
    })
}

async fn verify_checkout(
    State(state): State<AppState>,
    Json(req): Json<VerifyCheckoutRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    let response = state
        .verifier
        .verify(
            req.checkout_id.as_deref().unwrap_or_default(),
            req.user_id.as_deref().unwrap_or_default(),
            req.locale.unwrap_or_default(),
        )
        .await?;

    Ok(Json(response))
}

/// Explains why a payment did not go through. A processor error code
/// wins over the reason name when it is recognized.
async fn describe_failure(
    Query(query): Query<FailureQuery>,
) -> Result<Json<FailureResponse>, AppError> {
    let reason = match PaymentFailureReason::from_error_code(query.error_code.as_deref()) {
        PaymentFailureReason::Default => PaymentFailureReason::from_reason(query.reason.as_deref()),
        known => known,
    };
    let amount = match query.amount.filter(|a| !a.trim().is_empty()) {
        Some(amount) => Some(parse_amount("amount", &Value::String(amount))?),
        None => None,
    };

    Ok(Json(FailureResponse {
        reason,
        message: reason.message(query.locale.unwrap_or_default()),
        checkout_id: query.checkout_id.filter(|c| !c.is_empty()),
        amount,
    }))
}
