//! Savings Accounts
//!
//! Interest-bearing extension of an account. Interest is paid on
//! `min(tracked minimum balance, accrual cap)`; the first cycle after
//! opening only records the baseline.

pub mod interest;
pub mod processor;
pub mod types;

pub use interest::{Accrual, accrue};
pub use processor::{AccrualReport, SavingsInterestProcessor};
pub use types::{InterestPeriod, InterestRates, SavingsAccount};
