//! Operator endpoints.

use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::parse_amount;
use crate::error::AppError;
use crate::models::{decimal_places, NewBalanceTransaction, TransactionSource};
use crate::state::AppState;
use crate::store::{CreditOutcome, StoreError};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Request body for an operator credit.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCreditRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    pub amount: Value,
    #[serde(default)]
    pub note: Option<String>,
    /// `admin_api` (default) or `admin_script`.
    #[serde(default)]
    pub source: Option<TransactionSource>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCreditResponse {
    pub previous_balance: BigDecimal,
    pub added_amount: BigDecimal,
    pub new_balance: BigDecimal,
    pub transaction_id: Uuid,
}

/// Creates the admin router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/credit", post(admin_credit))
        .with_state(state)
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(AppError::Forbidden(
            "admin API is disabled (ADMIN_API_TOKEN not set)".to_string(),
        ));
    };
    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
        Ok(())
    } else {
        Err(AppError::Unauthorized("invalid admin token".to_string()))
    }
}

/// Credits an account outside the payment flow. Goes through the same
/// atomic credit as webhooks; not idempotent.
async fn admin_credit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdminCreditRequest>,
) -> Result<Json<AdminCreditResponse>, AppError> {
    authorize(&state, &headers)?;

    let user_id = req.user_id.unwrap_or_default().trim().to_string();
    if user_id.is_empty() {
        return Err(AppError::BadRequest("userId is required".to_string()));
    }
    let amount = parse_amount("amount", &req.amount)?;
    if amount <= BigDecimal::from(0) {
        return Err(AppError::BadRequest("amount must be positive".to_string()));
    }
    if decimal_places(&amount) > 4 {
        return Err(AppError::BadRequest(
            "amount has more than four decimal places".to_string(),
        ));
    }
    let source = match req.source.unwrap_or(TransactionSource::AdminApi) {
        TransactionSource::Polar => {
            return Err(AppError::BadRequest(
                "source must be admin_api or admin_script".to_string(),
            ))
        }
        source => source,
    };

    let credit = NewBalanceTransaction::admin_credit(user_id.clone(), amount, source, req.note);
    let outcome = tokio::time::timeout(state.store_timeout, state.store.apply_credit(credit))
        .await
        .map_err(|_| StoreError::Timeout(state.store_timeout))??;

    let CreditOutcome::Applied(tx) = outcome else {
        return Err(AppError::Internal(
            "admin credit was treated as a duplicate".to_string(),
        ));
    };

    tracing::info!(
        user_id = %tx.user_id,
        amount = %tx.total_credits,
        previous_balance = %tx.previous_balance,
        new_balance = %tx.new_balance,
        transaction_id = %tx.transaction_id,
        "Admin credit applied"
    );

    Ok(Json(AdminCreditResponse {
        previous_balance: tx.previous_balance,
        added_amount: tx.total_credits,
        new_balance: tx.new_balance,
        transaction_id: tx.transaction_id,
    }))
}
