//! Error types for OpenFees

use rust_decimal::Decimal;
use thiserror::Error;

/// OpenFees error type
#[derive(Error, Debug, Clone)]
pub enum FeeError {
    /// Bad input shape or value
    #[error("validation error: {0}")]
    Validation(String),

    /// Entity absent or outside the caller's tenant scope
    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness or reference constraint violated
    #[error("conflict: {0}")]
    Conflict(String),

    /// Wallet balance too low for the requested purchase
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Cost of the requested operation
        required: Decimal,
        /// Wallet balance at the time of the check
        available: Decimal,
    },

    /// SMS unit balance too low for the requested send
    #[error("insufficient SMS balance: need {required}, have {available}")]
    InsufficientSmsBalance {
        /// Units the operation needs
        required: i64,
        /// Units on the account
        available: i64,
    },

    /// Payment larger than the amount owed
    #[error("payment {amount} exceeds outstanding balance {balance}")]
    ExceedsBalance {
        /// Attempted payment amount
        amount: Decimal,
        /// Outstanding balance at the time of the check
        balance: Decimal,
    },

    /// SMS or payment provider returned failure or errored
    #[error("gateway failure: {0}")]
    Gateway(String),

    /// Tenant disabled or subscription lapsed
    #[error("tenant inactive: {0}")]
    TenantInactive(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

/// Result type for OpenFees
pub type FeeResult<T> = Result<T, FeeError>;
