use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::recurrence::{self, Frequency};
use crate::account::AccountId;
use crate::ledger::{DEFAULT_DESCRIPTION, TransferRequest};
use crate::money;

/// Scheduled transfer identifier (`scheduled_transfers.schedule_id`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(pub i64);

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rejected schedule definitions
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScheduleError {
    #[error("Amount must be positive with at most two decimal places")]
    InvalidAmount,

    #[error("Source and destination account cannot be the same")]
    SameAccount,

    #[error("End date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
}

/// Recurring transfer between two accounts
///
/// `next_occurrence_date` is `None` once the series is retired or degraded;
/// otherwise it lies within `[start_date, end_date]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTransfer {
    pub schedule_id: ScheduleId,
    pub source: AccountId,
    pub destination: AccountId,
    /// In the source account's currency
    pub amount: Decimal,
    pub description: String,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_occurrence_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTransfer {
    /// Day of month all month/year steps are anchored to
    #[inline]
    pub fn anchor_day(&self) -> u32 {
        self.start_date.day()
    }

    /// Whether the schedule must run on `today`
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.next_occurrence_date.is_some_and(|next| next <= today)
            && self.start_date <= today
            && self.end_date.is_none_or(|end| end >= today)
    }

    /// Next run date after `today`, or `None` when the series is exhausted
    pub fn next_occurrence(&self, today: NaiveDate) -> Option<NaiveDate> {
        let from = self.next_occurrence_date.unwrap_or(self.start_date);
        recurrence::next_occurrence(
            self.frequency,
            self.anchor_day(),
            from,
            self.end_date,
            today,
        )
    }

    /// The ledger request one occurrence executes
    pub fn transfer_request(&self) -> TransferRequest {
        TransferRequest::new(self.source, self.destination, self.amount)
            .with_description(self.description.clone())
    }
}

/// User-submitted schedule definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScheduledTransfer {
    pub source: AccountId,
    pub destination: AccountId,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl NewScheduledTransfer {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if !money::is_valid_amount(self.amount) {
            return Err(ScheduleError::InvalidAmount);
        }
        if self.source == self.destination {
            return Err(ScheduleError::SameAccount);
        }
        if let Some(end) = self.end_date
            && end < self.start_date
        {
            return Err(ScheduleError::EndBeforeStart {
                start: self.start_date,
                end,
            });
        }
        Ok(())
    }

    pub fn description(&self) -> String {
        match self.description.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => DEFAULT_DESCRIPTION.to_string(),
        }
    }

    /// Materialise the row; the first occurrence is the start date
    pub fn into_schedule(self, schedule_id: ScheduleId, now: DateTime<Utc>) -> ScheduledTransfer {
        let description = self.description();
        ScheduledTransfer {
            schedule_id,
            source: self.source,
            destination: self.destination,
            amount: self.amount,
            description,
            frequency: self.frequency,
            start_date: self.start_date,
            end_date: self.end_date,
            next_occurrence_date: Some(self.start_date),
            created_at: now,
            updated_at: now,
        }
    }
}
