//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use fanpay_core::BillingError;
use fanpay_store::StoreError;

use crate::paypal::PaypalError;
use crate::stripe::StripeError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Valid credentials, wrong party.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unknown paid request action.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// Malformed or out-of-range input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Required query parameters are absent.
    #[error("missing parameters: {0}")]
    MissingParams(String),

    /// Wallet balance does not cover the charge.
    #[error("insufficient funds: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Current balance in cents.
        balance: i64,
        /// Required amount in cents.
        required: i64,
    },

    /// The provider reports the payment as not (fully) paid.
    #[error("payment not successful: {0}")]
    PaymentNotSuccessful(String),

    /// The payment belongs to another user, room or resource.
    #[error("invalid owner: {0}")]
    InvalidOwner(String),

    /// Flash drop has no inventory left.
    #[error("sold out")]
    SoldOut,

    /// The request is not in a state that allows the action.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A verified payment could not be settled.
    #[error("payment failed: {0}")]
    PaymentFailed(String),

    /// A payment provider failed or is not configured. The detail is logged, never returned.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Authentication required".to_string(),
                None,
            ),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::InvalidAction(action) => (
                StatusCode::BAD_REQUEST,
                "invalid_action",
                format!("Unknown action: {action}"),
                None,
            ),
            Self::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_input", msg.clone(), None)
            }
            Self::MissingParams(msg) => {
                (StatusCode::BAD_REQUEST, "missing_params", msg.clone(), None)
            }
            Self::InsufficientFunds { balance, required } => (
                StatusCode::BAD_REQUEST,
                "insufficient_funds",
                "Insufficient wallet balance".to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::PaymentNotSuccessful(msg) => (
                StatusCode::BAD_REQUEST,
                "payment_not_successful",
                msg.clone(),
                None,
            ),
            Self::InvalidOwner(msg) => (StatusCode::FORBIDDEN, "invalid_owner", msg.clone(), None),
            Self::SoldOut => (
                StatusCode::BAD_REQUEST,
                "sold_out",
                "Flash drop is sold out".to_string(),
                None,
            ),
            Self::InvalidTransition(msg) => {
                (StatusCode::CONFLICT, "invalid_transition", msg.clone(), None)
            }
            Self::PaymentFailed(msg) => {
                tracing::error!(error = %msg, "Payment settlement failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "payment_failed",
                    "Payment could not be completed".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => {
                tracing::warn!(error = %msg, "Payment provider call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "external_service_error",
                    "Payment provider unavailable".to_string(),
                    None,
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::InsufficientFunds { balance, required } => {
                Self::InsufficientFunds { balance, required }
            }
            BillingError::SoldOut => Self::SoldOut,
            BillingError::InvalidAction(action) => Self::InvalidAction(action),
            BillingError::Forbidden(msg) => Self::Forbidden(msg),
            BillingError::InvalidTransition { .. } => Self::InvalidTransition(err.to_string()),
            BillingError::InvalidInput(msg) => Self::InvalidInput(msg),
            BillingError::InvalidId(e) => Self::InvalidInput(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("Not found".into()),
            StoreError::InsufficientFunds { balance, required } => {
                Self::InsufficientFunds { balance, required }
            }
            StoreError::DuplicatePaymentReference { .. } => {
                Self::InvalidOwner("Payment reference was already used".into())
            }
            StoreError::Billing(e) => e.into(),
            StoreError::Database(msg)
            | StoreError::Serialization(msg)
            | StoreError::Conflict(msg) => Self::Internal(msg),
        }
    }
}

impl From<StripeError> for ApiError {
    fn from(err: StripeError) -> Self {
        tracing::warn!(error = %err, "Stripe request failed");
        match err {
            StripeError::InvalidSignature => Self::InvalidInput("Invalid webhook signature".into()),
            other => Self::ExternalService(format!("Stripe: {other}")),
        }
    }
}

impl From<PaypalError> for ApiError {
    fn from(err: PaypalError) -> Self {
        tracing::warn!(error = %err, "PayPal request failed");
        Self::ExternalService(format!("PayPal: {err}"))
    }
}
