//! Account Statement
//!
//! Read-only view of the ledger from the perspective of a set of accounts
//! (one account, or every account a user can access). Entries are grouped
//! by calendar day with per-currency income and outcome totals.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::types::{Transaction, TransactionId};
use crate::account::AccountId;
use crate::money::Currency;
use crate::store::{Store, StoreError};

/// Which side of the ledger to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    All,
    Income,
    Outcome,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Direction::All),
            "income" => Ok(Direction::Income),
            "outcome" => Ok(Direction::Outcome),
            other => Err(format!("Invalid direction: {}", other)),
        }
    }
}

/// Reporting window, measured back from midnight of "now"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    #[default]
    All,
    /// Last 365 days
    Year,
    /// Last 30 days
    Month,
    /// Last 7 days
    Week,
    Today,
    Yesterday,
    Day(NaiveDate),
}

impl Period {
    /// Half-open `[since, until)` window for `now`
    pub fn range(&self, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let today = now.date_naive();
        let midnight = |day: NaiveDate| day.and_time(NaiveTime::MIN).and_utc();
        let days_back = |n: u64| today.checked_sub_days(Days::new(n)).map(midnight);

        match self {
            Period::All => (None, None),
            Period::Year => (days_back(365), None),
            Period::Month => (days_back(30), None),
            Period::Week => (days_back(7), None),
            Period::Today => (Some(midnight(today)), None),
            Period::Yesterday => (days_back(1), Some(midnight(today))),
            Period::Day(day) => (
                Some(midnight(*day)),
                day.checked_add_days(Days::new(1)).map(midnight),
            ),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Period::All),
            "year" => Ok(Period::Year),
            "month" => Ok(Period::Month),
            "week" => Ok(Period::Week),
            "today" => Ok(Period::Today),
            "yesterday" => Ok(Period::Yesterday),
            other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
                .map(Period::Day)
                .map_err(|_| format!("Invalid period {:?}: use a keyword or YYYY-MM-DD", other)),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::All => f.write_str("all"),
            Period::Year => f.write_str("year"),
            Period::Month => f.write_str("month"),
            Period::Week => f.write_str("week"),
            Period::Today => f.write_str("today"),
            Period::Yesterday => f.write_str("yesterday"),
            Period::Day(day) => write!(f, "{}", day.format("%Y-%m-%d")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementEntry {
    pub transaction_id: TransactionId,
    pub at: DateTime<Utc>,
    pub direction: Direction,
    pub amount: Decimal,
    pub currency: Currency,
    pub description: String,
    /// The account on the other side of the transfer
    pub counterparty: AccountId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statement {
    pub days: BTreeMap<NaiveDate, Vec<StatementEntry>>,
    pub total_income: BTreeMap<Currency, Decimal>,
    pub total_outcome: BTreeMap<Currency, Decimal>,
    pub count: usize,
}

impl Statement {
    fn push(&mut self, entry: StatementEntry) {
        let totals = match entry.direction {
            Direction::Income => &mut self.total_income,
            _ => &mut self.total_outcome,
        };
        *totals.entry(entry.currency).or_insert(Decimal::ZERO) += entry.amount;
        self.days
            .entry(entry.at.date_naive())
            .or_default()
            .push(entry);
        self.count += 1;
    }
}

/// Build a statement for `accounts` out of `transactions`
///
/// A transfer between two accounts of the set yields both an income and an
/// outcome entry.
pub fn statement(
    accounts: &[AccountId],
    transactions: &[Transaction],
    direction: Direction,
    period: Period,
    now: DateTime<Utc>,
) -> Statement {
    let (since, until) = period.range(now);
    let mut out = Statement::default();

    for tx in transactions {
        if since.is_some_and(|s| tx.created_at < s) || until.is_some_and(|u| tx.created_at >= u) {
            continue;
        }

        let incoming = accounts.contains(&tx.destination);
        let outgoing = accounts.contains(&tx.source);

        if incoming && direction != Direction::Outcome {
            out.push(StatementEntry {
                transaction_id: tx.transaction_id,
                at: tx.created_at,
                direction: Direction::Income,
                amount: tx.converted_amount,
                currency: tx.destination_currency,
                description: tx.description.clone(),
                counterparty: tx.source,
            });
        }
        if outgoing && direction != Direction::Income {
            out.push(StatementEntry {
                transaction_id: tx.transaction_id,
                at: tx.created_at,
                direction: Direction::Outcome,
                amount: tx.amount,
                currency: tx.source_currency,
                description: tx.description.clone(),
                counterparty: tx.destination,
            });
        }
    }
    out
}

/// Load the matching rows from `store` and build the statement
pub async fn account_statement(
    store: &dyn Store,
    accounts: &[AccountId],
    direction: Direction,
    period: Period,
    now: DateTime<Utc>,
) -> Result<Statement, StoreError> {
    let (since, until) = period.range(now);
    let transactions = store.transactions_for(accounts, since, until).await?;
    Ok(statement(accounts, &transactions, direction, period, now))
}
