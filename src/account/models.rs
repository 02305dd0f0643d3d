//! Data models for bank accounts

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::money::Currency;

/// Bank account identifier (`accounts.account_id`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AccountId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Account lifecycle status
///
/// Stored as lowercase text. Only `Active` accounts may send or receive
/// transfers; `Frozen` accounts still accrue savings interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }

    /// Whether the account still takes part in interest accrual
    pub fn accrues_interest(&self) -> bool {
        matches!(self, AccountStatus::Active | AccountStatus::Frozen)
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "frozen" => Ok(AccountStatus::Frozen),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(format!("Invalid account status: {}", other)),
        }
    }
}

/// Bank account
///
/// `balance` is never negative; it is mutated only by the ledger engine and
/// the savings interest processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    /// Owning principal. Shared members get access, not ownership.
    pub owner_id: i64,
    pub currency: Currency,
    pub balance: Decimal,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Calendar day the account was opened on
    pub fn opened_on(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}
