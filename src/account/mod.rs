//! Account management module
//!
//! Account rows are created by account opening (outside this crate); here
//! they are only read, locked and re-balanced.

pub mod models;

pub use models::{Account, AccountId, AccountStatus};
