//! Failure Policy
//!
//! Decides what happens to a schedule after one processing attempt.
//!
//! ```text
//! success                       -> Rescheduled(next) | Retired
//! recoverable failure           -> Rescheduled(next) | Retired
//!   (codes from `scheduler.recoverable_errors`, default INSUFFICIENT_FUNDS,
//!    INACTIVE_ACCOUNT, CONVERSION_UNAVAILABLE)
//! fatal failure, Reschedule     -> Rescheduled(next) | Retired
//! fatal failure, Degrade        -> Degraded (kept, next date cleared)
//! fatal failure, Retire         -> Retired
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::ledger::LedgerError;
use crate::ledger::error::DEFAULT_RECOVERABLE_CODES;

/// Configured reaction to a fatal transfer failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalFailureAction {
    /// Treat like a recoverable miss
    #[default]
    Reschedule,
    /// Keep the schedule with no next date, awaiting manual intervention
    Degrade,
    /// Delete the schedule
    Retire,
}

/// Schedule state after processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Rescheduled(NaiveDate),
    Retired,
    Degraded,
}

impl fmt::Display for ScheduleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleOutcome::Rescheduled(date) => write!(f, "RESCHEDULED({})", date),
            ScheduleOutcome::Retired => f.write_str("RETIRED"),
            ScheduleOutcome::Degraded => f.write_str("DEGRADED"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailurePolicy {
    pub fatal: FatalFailureAction,
    /// Error codes treated as recoverable; everything else is fatal
    recoverable: BTreeSet<String>,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::new(FatalFailureAction::default())
    }
}

impl FailurePolicy {
    pub fn new(fatal: FatalFailureAction) -> Self {
        Self {
            fatal,
            recoverable: DEFAULT_RECOVERABLE_CODES
                .iter()
                .map(|code| code.to_string())
                .collect(),
        }
    }

    /// Replace the recoverable error codes
    pub fn with_recoverable<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recoverable = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_recoverable(&self, error: &LedgerError) -> bool {
        self.recoverable.contains(error.code())
    }

    pub fn after_success(&self, next: Option<NaiveDate>) -> ScheduleOutcome {
        advance_or_retire(next)
    }

    pub fn after_failure(&self, error: &LedgerError, next: Option<NaiveDate>) -> ScheduleOutcome {
        if self.is_recoverable(error) {
            return advance_or_retire(next);
        }
        match self.fatal {
            FatalFailureAction::Reschedule => advance_or_retire(next),
            FatalFailureAction::Degrade => ScheduleOutcome::Degraded,
            FatalFailureAction::Retire => ScheduleOutcome::Retired,
        }
    }
}

fn advance_or_retire(next: Option<NaiveDate>) -> ScheduleOutcome {
    match next {
        Some(date) => ScheduleOutcome::Rescheduled(date),
        None => ScheduleOutcome::Retired,
    }
}
