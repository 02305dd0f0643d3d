//! Account Invariant Guard
//!
//! Business rules a transfer must satisfy. Runs inside the unit of work,
//! after both account rows are locked, so the balance it checks is the
//! balance that gets written.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::account::{Account, AccountId, AccountStatus};

/// Named guard violations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Violation {
    #[error("Source and destination account cannot be the same")]
    SameAccount,

    #[error("Account {0} is not active ({1})")]
    InactiveAccount(AccountId, AccountStatus),

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },
}

/// Validate a transfer of `amount` (source currency) from `source` to `destination`
pub fn validate(source: &Account, destination: &Account, amount: Decimal) -> Result<(), Violation> {
    if source.account_id == destination.account_id {
        return Err(Violation::SameAccount);
    }

    for account in [source, destination] {
        if !account.is_active() {
            return Err(Violation::InactiveAccount(account.account_id, account.status));
        }
    }

    if source.balance < amount {
        return Err(Violation::InsufficientFunds {
            balance: source.balance,
            requested: amount,
        });
    }

    Ok(())
}
