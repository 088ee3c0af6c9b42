//! Error types for fanpay domain operations.

use crate::ids::IdError;
use crate::request::RequestStatus;

/// Result type for fanpay domain operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Business-rule failures raised by the domain layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BillingError {
    /// The wallet balance does not cover the charge.
    #[error("insufficient funds: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Current balance in cents.
        balance: i64,
        /// Required amount in cents.
        required: i64,
    },

    /// A flash drop has no inventory left.
    #[error("flash drop sold out")]
    SoldOut,

    /// An action name is not part of the paid request lifecycle.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// The caller is not the party allowed to perform this action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The entity is not in a state that allows the transition.
    #[error("cannot move request from {from} via {action}")]
    InvalidTransition {
        /// Current status.
        from: RequestStatus,
        /// Requested action.
        action: String,
    },

    /// Malformed or out-of-range input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
