//! Error types for the payout core

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for payout operations
pub type Result<T> = std::result::Result<T, Error>;

/// Payout errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Provider is not registered or not configured
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// KYC status is anything other than verified
    #[error("KYC not verified: {0}")]
    KycNotVerified(String),

    /// AML screening rejected the payout
    #[error("AML check failed: {0}")]
    AmlCheckFailed(String),

    /// KYC or AML collaborator could not be evaluated
    #[error("Compliance check unavailable: {0}")]
    ComplianceUnavailable(String),

    /// Fiat currency is not in the supported set
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    /// Malformed amount or request field
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Net payout below the configured minimum
    #[error("Payout amount {amount} below minimum {minimum}")]
    PayoutAmountBelowMinimum {
        /// Requested amount
        amount: Decimal,
        /// Configured minimum
        minimum: Decimal,
    },

    /// Net payout above the configured or per-transaction maximum
    #[error("Payout amount {amount} above maximum {maximum}")]
    PayoutAmountAboveMaximum {
        /// Requested amount
        amount: Decimal,
        /// Configured maximum
        maximum: Decimal,
    },

    /// Daily allowance would be exceeded
    #[error("Daily limit exceeded: requested {requested}, remaining {remaining}")]
    DailyLimitExceeded {
        /// Requested amount
        requested: Decimal,
        /// Remaining daily allowance
        remaining: Decimal,
    },

    /// Monthly allowance would be exceeded
    #[error("Monthly limit exceeded: requested {requested}, remaining {remaining}")]
    MonthlyLimitExceeded {
        /// Requested amount
        requested: Decimal,
        /// Remaining monthly allowance
        remaining: Decimal,
    },

    /// Payout already reached a terminal state
    #[error("Payout already processed: {0}")]
    PayoutAlreadyProcessed(String),

    /// Idempotency key already used
    #[error("Duplicate payout for idempotency key: {0}")]
    DuplicatePayout(String),

    /// Transition not allowed by the lifecycle table
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Stored version moved since the record was read
    #[error("Version conflict for payout {0}")]
    VersionConflict(String),

    /// Payout not found
    #[error("Payout not found: {0}")]
    PayoutNotFound(String),

    /// Quote not found (never issued, already consumed, or purged)
    #[error("Quote not found: {0}")]
    QuoteNotFound(String),

    /// Reconciliation record not found
    #[error("Reconciliation record not found: {0}")]
    RecordNotFound(String),

    /// Payout could not be executed
    #[error("Payout failed: {0}")]
    PayoutFailed(String),

    /// Provider temporarily unavailable
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Generic provider failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Informational integrity finding
    #[error("Reconciliation mismatch: {0}")]
    ReconciliationMismatch(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Error taxonomy used for routing and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid configuration
    Configuration,
    /// KYC/AML denial or evaluation failure
    Compliance,
    /// Malformed or out-of-range input
    Validation,
    /// Daily/monthly allowance exhausted
    Quota,
    /// Lifecycle conflict (duplicate, terminal, stale version)
    Conflict,
    /// Entity not found
    NotFound,
    /// Provider failure
    Upstream,
    /// Reconciliation discrepancy
    Integrity,
    /// Storage or internal failure
    Internal,
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ProviderNotConfigured(_) | Error::Config(_) => ErrorKind::Configuration,
            Error::KycNotVerified(_)
            | Error::AmlCheckFailed(_)
            | Error::ComplianceUnavailable(_) => ErrorKind::Compliance,
            Error::InvalidCurrency(_)
            | Error::InvalidAmount(_)
            | Error::PayoutAmountBelowMinimum { .. }
            | Error::PayoutAmountAboveMaximum { .. } => ErrorKind::Validation,
            Error::DailyLimitExceeded { .. } | Error::MonthlyLimitExceeded { .. } => {
                ErrorKind::Quota
            }
            Error::PayoutAlreadyProcessed(_)
            | Error::DuplicatePayout(_)
            | Error::InvalidTransition { .. }
            | Error::VersionConflict(_) => ErrorKind::Conflict,
            Error::PayoutNotFound(_) | Error::QuoteNotFound(_) | Error::RecordNotFound(_) => {
                ErrorKind::NotFound
            }
            Error::PayoutFailed(_) | Error::ProviderUnavailable(_) | Error::Provider(_) => {
                ErrorKind::Upstream
            }
            Error::ReconciliationMismatch(_) => ErrorKind::Integrity,
            Error::Storage(_) | Error::Serialization(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Config(format!("metrics registration failed: {}", err))
    }
}
