//! Error types and HTTP error response handling.
//!
//! `AppError` covers the unexpected failures that are allowed to propagate
//! out of handlers (database faults, programming errors). Expected business
//! failures never come through here; the Transfer Initiator returns those
//! as structured `PayoutResult`s instead.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::stores::{LedgerError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// API key is missing, invalid, or inactive. HTTP 401.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Webhook signature missing or failed verification. HTTP 401.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Requested payout does not exist. HTTP 404.
    #[error("Payout not found")]
    PayoutNotFound,

    /// Request body or parameters are invalid. HTTP 400.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// Invariant violation or other programming error. Logged with full
    /// context; clients only see a generic 500.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound => AppError::PayoutNotFound,
            LedgerError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// All errors return JSON shaped as:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                self.to_string(),
            ),
            AppError::PayoutNotFound => {
                (StatusCode::NOT_FOUND, "payout_not_found", self.to_string())
            }
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Database(ref e) => {
                tracing::error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Internal(ref msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
