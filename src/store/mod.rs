//! Persistence Layer
//!
//! Repository and unit-of-work interfaces injected into the ledger engine
//! and the processors. There is no implicit "current transaction": every
//! mutation goes through an explicit [`UnitOfWork`] that is either
//! committed or rolled back as a whole.
//!
//! # Implementations
//!
//! - [`PgStore`] - PostgreSQL via sqlx; row locks with `SELECT ... FOR UPDATE`
//! - [`MemoryStore`] - in-process, one unit of work at a time (serializable)

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::account::{Account, AccountId};
use crate::ledger::{NewTransaction, Transaction};
use crate::savings::SavingsAccount;
use crate::schedule::{NewScheduledTransfer, ScheduleId, ScheduledTransfer};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("Integrity violation: {0}")]
    Integrity(String),
}

/// Repository entry point
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a new atomic unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    /// Unlocked read of an account
    async fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Ledger entries touching any of `accounts`, oldest first, created in `[since, until)`
    async fn transactions_for(
        &self,
        accounts: &[AccountId],
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Persist a validated schedule definition
    async fn create_schedule(
        &self,
        new: NewScheduledTransfer,
    ) -> Result<ScheduledTransfer, StoreError>;

    async fn schedule(&self, id: ScheduleId) -> Result<Option<ScheduledTransfer>, StoreError>;

    /// User cancellation: delete the schedule. Returns false if it did not exist.
    async fn cancel_schedule(&self, id: ScheduleId) -> Result<bool, StoreError>;

    /// Ids of schedules due on `today`; each must be re-claimed in its own unit
    async fn due_schedule_ids(&self, today: NaiveDate) -> Result<Vec<ScheduleId>, StoreError>;

    /// Persist the savings terms of an existing account
    async fn create_savings(&self, savings: &SavingsAccount) -> Result<(), StoreError>;

    async fn savings_account(&self, id: AccountId) -> Result<Option<SavingsAccount>, StoreError>;

    /// Ids of savings accounts whose interest date is `today`
    async fn due_savings_ids(&self, today: NaiveDate) -> Result<Vec<AccountId>, StoreError>;
}

/// One atomic unit of work
///
/// Dropping a unit without committing rolls it back.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Lock an account row for the rest of the unit
    ///
    /// Callers locking several rows must do so in ascending id order.
    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Overwrite a locked account's balance; negative balances are rejected
    async fn set_balance(&mut self, id: AccountId, balance: Decimal) -> Result<(), StoreError>;

    /// Append a ledger entry
    async fn insert_transaction(&mut self, new: &NewTransaction)
    -> Result<Transaction, StoreError>;

    /// Lock the schedule if it is still due on `today`
    ///
    /// Returns `None` when it is gone, no longer due, or held by a concurrent run.
    async fn claim_due_schedule(
        &mut self,
        id: ScheduleId,
        today: NaiveDate,
    ) -> Result<Option<ScheduledTransfer>, StoreError>;

    async fn set_next_occurrence(
        &mut self,
        id: ScheduleId,
        next: Option<NaiveDate>,
    ) -> Result<(), StoreError>;

    async fn delete_schedule(&mut self, id: ScheduleId) -> Result<(), StoreError>;

    /// Lower the tracked minimum of the savings terms on `id`, if any, to `balance`
    ///
    /// Called after a debit with the account row already locked.
    async fn track_min_balance(&mut self, id: AccountId, balance: Decimal)
    -> Result<(), StoreError>;

    /// Lock the account row, then its savings terms if interest is due on `today`
    ///
    /// The account row is taken first, waiting on concurrent transfers, which
    /// lock in the same order. Returns `None` when the account does not accrue
    /// interest, the terms are no longer due, or another run holds them.
    async fn claim_due_savings(
        &mut self,
        id: AccountId,
        today: NaiveDate,
    ) -> Result<Option<(SavingsAccount, Account)>, StoreError>;

    async fn update_savings(&mut self, savings: &SavingsAccount) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
