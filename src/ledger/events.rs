//! Ledger Events
//!
//! Post-commit notifications for downstream consumers (achievements,
//! notifications). Events are published only after the unit of work has
//! committed, so a subscriber never observes a rolled-back transfer. The
//! ledger does not wait for, or depend on, any subscriber.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::trace;

use super::types::Transaction;
use crate::account::AccountId;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEvent {
    TransactionCommitted(Transaction),
    InterestAccrued {
        account_id: AccountId,
        amount: Decimal,
        on: NaiveDate,
    },
}

/// Broadcast fan-out of ledger events
///
/// Slow subscribers lag and lose the oldest events rather than blocking
/// the ledger.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: LedgerEvent) {
        // Err only means nobody is listening
        if self.tx.send(event).is_err() {
            trace!("Ledger event dropped: no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
