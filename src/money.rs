//! Money Module
//!
//! Currency codes and minor-unit arithmetic shared by the ledger, the
//! converter and the savings accrual. All balances are `rust_decimal::Decimal`
//! values with two decimal places.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of decimal places kept for every supported currency
pub const MINOR_UNITS: u32 = 2;

// ============================================================================
// Currency
// ============================================================================

/// Supported account currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Rub,
    Usd,
    Eur,
    Cny,
}

impl Currency {
    /// ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Rub => "RUB",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Cny => "CNY",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported currency: {0}")]
pub struct UnknownCurrency(pub String);

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RUB" => Ok(Currency::Rub),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "CNY" => Ok(Currency::Cny),
            _ => Err(UnknownCurrency(s.to_string())),
        }
    }
}

// ============================================================================
// Minor units
// ============================================================================

/// Round to the currency's minor unit (banker's rounding, same as the
/// database NUMERIC(15, 2) columns receive)
#[inline]
pub fn round_minor(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MINOR_UNITS, RoundingStrategy::MidpointNearestEven)
}

/// Amounts entering the ledger must be positive and already expressed in
/// minor units (no more than two decimal places)
#[inline]
pub fn is_valid_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && amount.normalize().scale() <= MINOR_UNITS
}
