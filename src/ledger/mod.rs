//! Ledger
//!
//! The atomic money-movement primitive and everything around it:
//!
//! - [`guard`] - business rules checked under the account row locks
//! - [`engine`] - executes a transfer as one unit of work
//! - [`events`] - post-commit notifications
//! - [`history`] - account statements over the append-only ledger

pub mod engine;
pub mod error;
pub mod events;
pub mod guard;
pub mod history;
pub mod types;

pub use engine::LedgerEngine;
pub use error::LedgerError;
pub use events::{EventBus, LedgerEvent};
pub use guard::Violation;
pub use history::{Direction, Period, Statement, StatementEntry};
pub use types::{
    DEFAULT_DESCRIPTION, NewTransaction, Transaction, TransactionId, TransactionStatus,
    TransferPreview, TransferRequest,
};
