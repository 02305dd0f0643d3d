//! Ledger Error Types

use thiserror::Error;

use super::guard::Violation;
use crate::account::{AccountId, AccountStatus};
use crate::converter::ConversionError;
use crate::store::StoreError;

/// Every code [`LedgerError::code`] can return
pub const ERROR_CODES: &[&str] = &[
    "INVALID_AMOUNT",
    "ACCOUNT_NOT_FOUND",
    "SAME_ACCOUNT",
    "INACTIVE_ACCOUNT",
    "ACCOUNT_CLOSED",
    "INSUFFICIENT_FUNDS",
    "CONVERSION_UNAVAILABLE",
    "PERSISTENCE_ERROR",
    "OVERFLOW",
];

/// Codes of failures a later attempt may get past: balances change, frozen
/// accounts get unfrozen and rate providers come back
pub const DEFAULT_RECOVERABLE_CODES: &[&str] =
    &["INSUFFICIENT_FUNDS", "INACTIVE_ACCOUNT", "CONVERSION_UNAVAILABLE"];

/// Ledger error types
///
/// Any error aborts the whole unit of work: no balance moves and no ledger
/// entry is written.
#[derive(Error, Debug)]
pub enum LedgerError {
    // === Validation Errors ===
    #[error("Amount must be positive with at most two decimal places")]
    InvalidAmount,

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error(transparent)]
    Rejected(#[from] Violation),

    // === Conversion Errors ===
    #[error("Currency conversion unavailable: {0}")]
    ConversionUnavailable(#[from] ConversionError),

    // === System Errors ===
    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),

    #[error("Balance arithmetic overflow on account {0}")]
    Overflow(AccountId),
}

impl LedgerError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount => "INVALID_AMOUNT",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::Rejected(Violation::SameAccount) => "SAME_ACCOUNT",
            LedgerError::Rejected(Violation::InactiveAccount(_, AccountStatus::Closed)) => {
                "ACCOUNT_CLOSED"
            }
            LedgerError::Rejected(Violation::InactiveAccount(..)) => "INACTIVE_ACCOUNT",
            LedgerError::Rejected(Violation::InsufficientFunds { .. }) => "INSUFFICIENT_FUNDS",
            LedgerError::ConversionUnavailable(_) => "CONVERSION_UNAVAILABLE",
            LedgerError::Store(_) => "PERSISTENCE_ERROR",
            LedgerError::Overflow(_) => "OVERFLOW",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidAmount | LedgerError::Rejected(Violation::SameAccount) => 400,
            LedgerError::AccountNotFound(_) => 404,
            LedgerError::Rejected(_) => 422,
            LedgerError::ConversionUnavailable(_) => 503,
            LedgerError::Store(_) | LedgerError::Overflow(_) => 500,
        }
    }

    /// Default classification: whether the same transfer may succeed on a later attempt
    ///
    /// Schedules use [`crate::schedule::FailurePolicy`], which can override it.
    pub fn is_recoverable(&self) -> bool {
        DEFAULT_RECOVERABLE_CODES.contains(&self.code())
    }
}
