//! API routes for the VerifyNum server.

pub mod accounts;
pub mod admin;
pub mod checkout;
pub mod webhook;

use std::str::FromStr;

use axum::{routing::get, Json, Router};
use bigdecimal::BigDecimal;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::models::is_bounded_amount;
use crate::state::AppState;

/// Longest amount text accepted before parsing.
const MAX_AMOUNT_TEXT_LEN: usize = 40;

/// Creates the main API router with all routes mounted.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1_routes(state))
        .layer(TraceLayer::new_for_http())
}

/// Creates the v1 API routes.
fn api_v1_routes(state: AppState) -> Router {
    Router::new()
        .merge(checkout::router(state.clone()))
        .nest("/webhook", webhook::router(state.clone()))
        .nest("/accounts", accounts::router(state.clone()))
        .nest("/admin", admin::router(state))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Reads a money amount sent either as a JSON number or a string.
pub(crate) fn parse_amount(field: &str, value: &Value) -> Result<BigDecimal, AppError> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => {
            return Err(AppError::BadRequest(format!(
                "{} must be a number, got {}",
                field, other
            )))
        }
    };
    if text.len() > MAX_AMOUNT_TEXT_LEN {
        return Err(AppError::BadRequest(format!("{} is too long", field)));
    }
    let amount = BigDecimal::from_str(&text)
        .map_err(|_| AppError::BadRequest(format!("{} is not a valid amount: {}", field, text)))?;
    if !is_bounded_amount(&amount) {
        return Err(AppError::BadRequest(format!("{} is out of range: {}", field, text)));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_accepts_numbers_and_strings() {
        let fifteen = BigDecimal::from_str("15.55").unwrap();
        assert_eq!(parse_amount("amount", &json!(15.55)).unwrap(), fifteen);
        assert_eq!(parse_amount("amount", &json!(" 15.55 ")).unwrap(), fifteen);
        assert!(parse_amount("amount", &json!("abc")).is_err());
        assert!(parse_amount("amount", &json!(true)).is_err());
    }

    #[test]
    fn test_parse_amount_rejects_unbounded_exponents() {
        assert!(matches!(
            parse_amount("amount", &json!("1e50000000")),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            parse_amount("amount", &json!("-1E-50000000")),
            Err(AppError::BadRequest(_))
        ));
        assert!(parse_amount("amount", &json!(1e300)).is_err());
        assert!(parse_amount("amount", &json!("1".repeat(64))).is_err());
        assert_eq!(
            parse_amount("amount", &json!("1.5e3")).unwrap(),
            BigDecimal::from(1500)
        );
    }
}
