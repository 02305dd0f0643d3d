//! Ledger Core Types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::account::AccountId;
use crate::money::Currency;

/// Description used when the initiator leaves it empty
pub const DEFAULT_DESCRIPTION: &str = "Money Transfer";

/// Ledger entry identifier (`transactions.transaction_id`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger entry status
///
/// The synchronous transfer path only ever writes `Completed`; `Pending`
/// and `Failed` are reserved for asynchronous settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("Invalid transaction status: {}", other)),
        }
    }
}

/// Committed ledger entry. Append-only: never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub created_at: DateTime<Utc>,
    pub status: TransactionStatus,
    pub source: AccountId,
    pub destination: AccountId,
    pub source_currency: Currency,
    pub destination_currency: Currency,
    /// Debited from `source`, in the source currency
    pub amount: Decimal,
    /// Credited to `destination`, in the destination currency
    pub converted_amount: Decimal,
    pub description: String,
}

/// Ledger entry before the store assigns its id and timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub status: TransactionStatus,
    pub source: AccountId,
    pub destination: AccountId,
    pub source_currency: Currency,
    pub destination_currency: Currency,
    pub amount: Decimal,
    pub converted_amount: Decimal,
    pub description: String,
}

/// A request to move `amount` (source currency) between two accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source: AccountId,
    pub destination: AccountId,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransferRequest {
    pub fn new(source: AccountId, destination: AccountId, amount: Decimal) -> Self {
        Self {
            source,
            destination,
            amount,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Description to record, falling back to the default for blank input
    pub fn description(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

/// Result of a dry-run conversion shown before the user confirms a transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferPreview {
    pub source: AccountId,
    pub destination: AccountId,
    pub source_currency: Currency,
    pub destination_currency: Currency,
    pub amount: Decimal,
    pub converted_amount: Decimal,
}
