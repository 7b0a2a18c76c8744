//! HTTP-facing error type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::reconcile::{CheckoutError, VerifyError, WebhookError};
use crate::store::StoreError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServiceUnavailable(msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            AppError::Store(e) => {
                tracing::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = if status == StatusCode::SERVICE_UNAVAILABLE {
            json!({ "success": false, "status": "error", "error": message })
        } else {
            json!({ "success": false, "error": message })
        };
        (status, Json(body)).into_response()
    }
}

impl From<CheckoutError> for AppError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::ProviderUnavailable(_) => AppError::ServiceUnavailable(e.to_string()),
            _ => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<VerifyError> for AppError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::MissingCheckoutId | VerifyError::MissingUserId => {
                AppError::BadRequest(e.to_string())
            }
            VerifyError::Unauthorized => AppError::Forbidden(e.to_string()),
            VerifyError::NotFound(_) => AppError::NotFound(e.to_string()),
            VerifyError::ProviderUnavailable(_) => AppError::ServiceUnavailable(e.to_string()),
            VerifyError::Store(e) => AppError::Store(e),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::NotConfigured => AppError::ServiceUnavailable(e.to_string()),
            WebhookError::Signature(_) => AppError::Unauthorized(e.to_string()),
            WebhookError::Store(e) => AppError::Store(e),
        }
    }
}
