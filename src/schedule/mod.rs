//! Scheduled Transfers
//!
//! Recurring transfers re-invoke the ledger on a calendar cadence.
//!
//! # Schedule States
//!
//! ```text
//! Scheduled --(next date <= today)--> Due --> Rescheduled (back to Scheduled)
//!                                         --> Retired (deleted)
//!                                         --> Degraded (kept, no next date)
//! ```

pub mod policy;
pub mod processor;
pub mod recurrence;
pub mod types;

pub use policy::{FailurePolicy, FatalFailureAction, ScheduleOutcome};
pub use processor::{ProcessingReport, ScheduledTransferProcessor};
pub use recurrence::Frequency;
pub use types::{NewScheduledTransfer, ScheduleError, ScheduleId, ScheduledTransfer};
