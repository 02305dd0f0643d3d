//! Family Ledger - ledger and scheduling engine for a family banking backend
//!
//! # Modules
//!
//! - [`money`] - Currency codes and minor-unit rounding
//! - [`account`] - Accounts and their lifecycle status
//! - [`converter`] - Exchange-rate provider and currency conversion
//! - [`ledger`] - Atomic transfers, guard rules, events, statements
//! - [`schedule`] - Recurrence calculator and scheduled-transfer processor
//! - [`savings`] - Savings terms and the interest processor
//! - [`store`] - Repository / unit-of-work traits (PostgreSQL, in-memory)
//! - [`worker`] - Daily trigger loop

// Core types - must be first!
pub mod account;
pub mod money;

// Ambient
pub mod config;
pub mod logging;

// Engine
pub mod converter;
pub mod ledger;
pub mod savings;
pub mod schedule;
pub mod store;
pub mod worker;

// Convenient re-exports at crate root
pub use account::{Account, AccountId, AccountStatus};
pub use config::AppConfig;
pub use converter::{CurrencyConverter, HttpRateProvider, RateProvider};
pub use ledger::{EventBus, LedgerEngine, LedgerError, LedgerEvent, Transaction, TransferRequest};
pub use money::Currency;
pub use savings::{SavingsAccount, SavingsInterestProcessor};
pub use schedule::{FailurePolicy, Frequency, ScheduledTransfer, ScheduledTransferProcessor};
pub use store::{MemoryStore, PgStore, Store, StoreError, UnitOfWork};
pub use worker::{DailyWorker, WorkerConfig};
