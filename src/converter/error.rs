use thiserror::Error;

use crate::money::Currency;

/// Currency conversion failures
///
/// Every variant means the rate is unavailable right now. Callers treat
/// them as transient: an interactive transfer fails immediately, a
/// scheduled transfer is tried again on its next occurrence.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversionError {
    #[error("Rate provider unreachable: {0}")]
    Unreachable(String),

    #[error("Rate provider request timed out")]
    Timeout,

    #[error("Rate provider returned HTTP {0}")]
    Status(u16),

    #[error("Rate provider has no {quote} rate for base {base}")]
    MissingRate { base: Currency, quote: Currency },

    #[error("Rate provider returned an invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<reqwest::Error> for ConversionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ConversionError::Timeout
        } else if e.is_decode() {
            ConversionError::InvalidPayload(e.to_string())
        } else {
            ConversionError::Unreachable(e.to_string())
        }
    }
}
