//! Scheduled-Transfer Processor
//!
//! Periodic job that executes every due schedule for a given day.
//!
//! Each schedule is handled in isolation:
//!
//! ```text
//! unit A: claim -> transfer -> advance/delete schedule -> commit -> publish
//! on transfer failure:
//!   rollback A
//!   unit B: re-claim -> apply failure policy -> commit
//! ```
//!
//! The success path commits the transfer together with the schedule update,
//! so a schedule is never advanced without its transfer or vice versa. A
//! failed transfer still moves the schedule off today's date so the next run
//! does not retry it in a loop.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::policy::{FailurePolicy, ScheduleOutcome};
use super::types::ScheduleId;
use crate::ledger::{LedgerEngine, LedgerError, LedgerEvent};
use crate::store::{StoreError, UnitOfWork};

/// Counters for one processor run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingReport {
    /// Schedules selected as due
    pub due: usize,
    /// Transfers committed
    pub succeeded: usize,
    /// Transfers rejected by the ledger
    pub failed: usize,
    pub rescheduled: usize,
    pub retired: usize,
    pub degraded: usize,
    /// Claimed by a concurrent run or no longer due
    pub skipped: usize,
    /// Units that could not be persisted
    pub errors: usize,
}

impl ProcessingReport {
    fn record(&mut self, outcome: ScheduleOutcome) {
        match outcome {
            ScheduleOutcome::Rescheduled(_) => self.rescheduled += 1,
            ScheduleOutcome::Retired => self.retired += 1,
            ScheduleOutcome::Degraded => self.degraded += 1,
        }
    }
}

/// What happened to one claimed schedule
#[derive(Debug)]
enum Processed {
    Transferred(ScheduleOutcome),
    Rejected(LedgerError, ScheduleOutcome),
    Skipped,
}

pub struct ScheduledTransferProcessor {
    ledger: Arc<LedgerEngine>,
    policy: FailurePolicy,
}

impl ScheduledTransferProcessor {
    pub fn new(ledger: Arc<LedgerEngine>, policy: FailurePolicy) -> Self {
        Self { ledger, policy }
    }

    /// Process every schedule due on `today`
    ///
    /// Only the initial due-selection can fail the run; per-schedule errors
    /// are logged and counted.
    pub async fn run(&self, today: NaiveDate) -> Result<ProcessingReport, StoreError> {
        let ids = self.ledger.store().due_schedule_ids(today).await?;
        let mut report = ProcessingReport {
            due: ids.len(),
            ..Default::default()
        };

        if ids.is_empty() {
            debug!(%today, "No scheduled transfers due");
            return Ok(report);
        }
        info!(%today, count = ids.len(), "Processing scheduled transfers");

        for id in ids {
            match self.process(id, today).await {
                Ok(Processed::Transferred(outcome)) => {
                    report.succeeded += 1;
                    report.record(outcome);
                    info!(schedule_id = %id, outcome = %outcome, "Scheduled transfer executed");
                }
                Ok(Processed::Rejected(e, outcome)) => {
                    report.failed += 1;
                    report.record(outcome);
                    warn!(
                        schedule_id = %id,
                        error = %e,
                        code = e.code(),
                        recoverable = self.policy.is_recoverable(&e),
                        outcome = %outcome,
                        "Scheduled transfer failed"
                    );
                }
                Ok(Processed::Skipped) => {
                    report.skipped += 1;
                    debug!(schedule_id = %id, "Schedule skipped: claimed elsewhere or no longer due");
                }
                Err(e) => {
                    report.errors += 1;
                    error!(schedule_id = %id, error = %e, "Failed to process schedule");
                }
            }
        }

        info!(
            due = report.due,
            succeeded = report.succeeded,
            failed = report.failed,
            rescheduled = report.rescheduled,
            retired = report.retired,
            degraded = report.degraded,
            skipped = report.skipped,
            errors = report.errors,
            "Scheduled transfer run complete"
        );
        Ok(report)
    }

    async fn process(&self, id: ScheduleId, today: NaiveDate) -> Result<Processed, StoreError> {
        let store = self.ledger.store();

        let mut uow = store.begin().await?;
        let Some(schedule) = uow.claim_due_schedule(id, today).await? else {
            uow.rollback().await?;
            return Ok(Processed::Skipped);
        };
        let next = schedule.next_occurrence(today);

        let failure = match self
            .ledger
            .transfer_in(uow.as_mut(), &schedule.transfer_request())
            .await
        {
            Ok(tx) => {
                let outcome = self.policy.after_success(next);
                apply(uow.as_mut(), id, outcome).await?;
                uow.commit().await?;
                self.ledger
                    .events()
                    .publish(LedgerEvent::TransactionCommitted(tx));
                return Ok(Processed::Transferred(outcome));
            }
            Err(e) => e,
        };

        uow.rollback().await?;

        let mut uow = store.begin().await?;
        let Some(schedule) = uow.claim_due_schedule(id, today).await? else {
            uow.rollback().await?;
            return Ok(Processed::Skipped);
        };
        let outcome = self
            .policy
            .after_failure(&failure, schedule.next_occurrence(today));
        apply(uow.as_mut(), id, outcome).await?;
        uow.commit().await?;

        Ok(Processed::Rejected(failure, outcome))
    }
}

async fn apply(
    uow: &mut dyn UnitOfWork,
    id: ScheduleId,
    outcome: ScheduleOutcome,
) -> Result<(), StoreError> {
    match outcome {
        ScheduleOutcome::Rescheduled(date) => uow.set_next_occurrence(id, Some(date)).await,
        ScheduleOutcome::Retired => uow.delete_schedule(id).await,
        ScheduleOutcome::Degraded => uow.set_next_occurrence(id, None).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Account, AccountId, AccountStatus};
    use crate::converter::{CurrencyConverter, MockRateProvider};
    use crate::ledger::EventBus;
    use crate::money::Currency;
    use crate::schedule::policy::FatalFailureAction;
    use crate::schedule::{Frequency, NewScheduledTransfer};
    use crate::store::{MemoryStore, Store};
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn account(id: i64, currency: Currency, balance: i64) -> Account {
        Account {
            account_id: AccountId(id),
            owner_id: 1,
            currency,
            balance: Decimal::from(balance),
            status: AccountStatus::Active,
            created_at: Utc::now(),
        }
    }

    fn new_schedule(
        source: i64,
        destination: i64,
        amount: i64,
        frequency: Frequency,
        start: NaiveDate,
    ) -> NewScheduledTransfer {
        NewScheduledTransfer {
            source: AccountId(source),
            destination: AccountId(destination),
            amount: Decimal::from(amount),
            description: Some("allowance".to_string()),
            frequency,
            start_date: start,
            end_date: None,
        }
    }

    async fn setup(
        accounts: Vec<Account>,
        fatal: FatalFailureAction,
    ) -> (ScheduledTransferProcessor, MemoryStore, Arc<MockRateProvider>) {
        let store = MemoryStore::new();
        for a in accounts {
            store.insert_account(a).await;
        }
        let provider = Arc::new(MockRateProvider::new());
        let ledger = Arc::new(LedgerEngine::new(
            Arc::new(store.clone()),
            Arc::new(CurrencyConverter::new(provider.clone())),
            EventBus::default(),
        ));
        let processor = ScheduledTransferProcessor::new(ledger, FailurePolicy::new(fatal));
        (processor, store, provider)
    }

    #[tokio::test]
    async fn test_monthly_success_reschedules() {
        let (processor, store, _) = setup(
            vec![account(1, Currency::Rub, 500), account(2, Currency::Rub, 0)],
            FatalFailureAction::Reschedule,
        )
        .await;
        let schedule = store
            .create_schedule(new_schedule(1, 2, 100, Frequency::Monthly, date(2023, 1, 31)))
            .await
            .unwrap();

        let report = processor.run(date(2023, 1, 31)).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.rescheduled, 1);

        let reloaded = store.schedule(schedule.schedule_id).await.unwrap().unwrap();
        assert_eq!(reloaded.next_occurrence_date, Some(date(2023, 2, 28)));

        processor.run(date(2023, 2, 28)).await.unwrap();
        let reloaded = store.schedule(schedule.schedule_id).await.unwrap().unwrap();
        assert_eq!(reloaded.next_occurrence_date, Some(date(2023, 3, 31)));
        assert_eq!(store.balance(AccountId(1)).await, Some(Decimal::from(300)));
        assert_eq!(store.balance(AccountId(2)).await, Some(Decimal::from(200)));
    }

    #[tokio::test]
    async fn test_insufficient_funds_reschedules_without_transfer() {
        let (processor, store, _) = setup(
            vec![account(1, Currency::Rub, 10), account(2, Currency::Rub, 0)],
            FatalFailureAction::Degrade,
        )
        .await;
        let schedule = store
            .create_schedule(new_schedule(1, 2, 100, Frequency::Weekly, date(2024, 3, 4)))
            .await
            .unwrap();

        let report = processor.run(date(2024, 3, 4)).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.rescheduled, 1);
        assert_eq!(report.degraded, 0);

        let reloaded = store.schedule(schedule.schedule_id).await.unwrap().unwrap();
        assert_eq!(reloaded.next_occurrence_date, Some(date(2024, 3, 11)));
        assert!(store.transactions().await.is_empty());
        assert_eq!(store.balance(AccountId(1)).await, Some(Decimal::from(10)));
    }

    #[tokio::test]
    async fn test_failed_once_schedule_is_retired() {
        let (processor, store, _) = setup(
            vec![account(1, Currency::Rub, 10), account(2, Currency::Rub, 0)],
            FatalFailureAction::Reschedule,
        )
        .await;
        let schedule = store
            .create_schedule(new_schedule(1, 2, 100, Frequency::Once, date(2024, 3, 4)))
            .await
            .unwrap();

        let report = processor.run(date(2024, 3, 4)).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.retired, 1);
        assert!(store.schedule(schedule.schedule_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_destination_degrades() {
        let mut closed = account(2, Currency::Rub, 0);
        closed.status = AccountStatus::Closed;
        let (processor, store, _) = setup(
            vec![account(1, Currency::Rub, 500), closed],
            FatalFailureAction::Degrade,
        )
        .await;
        let schedule = store
            .create_schedule(new_schedule(1, 2, 100, Frequency::Weekly, date(2024, 2, 27)))
            .await
            .unwrap();

        let report = processor.run(date(2024, 2, 27)).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.degraded, 1);
        assert_eq!(report.rescheduled, 0);

        let reloaded = store.schedule(schedule.schedule_id).await.unwrap().unwrap();
        assert_eq!(reloaded.next_occurrence_date, None);
        assert_eq!(store.balance(AccountId(1)).await, Some(Decimal::from(500)));
    }

    #[tokio::test]
    async fn test_fatal_failure_degrades_when_configured() {
        let (processor, store, _) = setup(
            vec![account(1, Currency::Rub, 500)],
            FatalFailureAction::Degrade,
        )
        .await;
        // Destination account does not exist: fatal
        let schedule = store
            .create_schedule(new_schedule(1, 99, 100, Frequency::Daily, date(2024, 3, 4)))
            .await
            .unwrap();

        let report = processor.run(date(2024, 3, 4)).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.degraded, 1);

        let reloaded = store.schedule(schedule.schedule_id).await.unwrap().unwrap();
        assert_eq!(reloaded.next_occurrence_date, None);

        // Degraded schedules are never due again
        let report = processor.run(date(2024, 3, 5)).await.unwrap();
        assert_eq!(report.due, 0);
    }

    #[tokio::test]
    async fn test_fatal_failure_reschedules_by_default() {
        let (processor, store, _) = setup(
            vec![account(1, Currency::Rub, 500)],
            FatalFailureAction::default(),
        )
        .await;
        let schedule = store
            .create_schedule(new_schedule(1, 99, 100, Frequency::Daily, date(2024, 3, 4)))
            .await
            .unwrap();

        processor.run(date(2024, 3, 4)).await.unwrap();
        let reloaded = store.schedule(schedule.schedule_id).await.unwrap().unwrap();
        assert_eq!(reloaded.next_occurrence_date, Some(date(2024, 3, 5)));
    }

    #[tokio::test]
    async fn test_conversion_outage_is_recoverable() {
        let (processor, store, provider) = setup(
            vec![account(1, Currency::Usd, 500), account(2, Currency::Rub, 0)],
            FatalFailureAction::Retire,
        )
        .await;
        provider.set_unavailable(true);
        let schedule = store
            .create_schedule(new_schedule(1, 2, 10, Frequency::Daily, date(2024, 3, 4)))
            .await
            .unwrap();

        let report = processor.run(date(2024, 3, 4)).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.rescheduled, 1);
        assert!(store.schedule(schedule.schedule_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missed_cycles_fast_forward() {
        let (processor, store, _) = setup(
            vec![account(1, Currency::Rub, 500), account(2, Currency::Rub, 0)],
            FatalFailureAction::Reschedule,
        )
        .await;
        let schedule = store
            .create_schedule(new_schedule(1, 2, 10, Frequency::Daily, date(2024, 3, 1)))
            .await
            .unwrap();

        // System was down for four days: one transfer, next date in the future
        let report = processor.run(date(2024, 3, 5)).await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(store.transactions().await.len(), 1);

        let reloaded = store.schedule(schedule.schedule_id).await.unwrap().unwrap();
        assert_eq!(reloaded.next_occurrence_date, Some(date(2024, 3, 6)));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let (processor, store, _) = setup(
            vec![
                account(1, Currency::Rub, 50),
                account(2, Currency::Rub, 0),
                account(3, Currency::Rub, 500),
            ],
            FatalFailureAction::Reschedule,
        )
        .await;
        store
            .create_schedule(new_schedule(1, 2, 100, Frequency::Weekly, date(2024, 3, 4)))
            .await
            .unwrap();
        store
            .create_schedule(new_schedule(3, 2, 100, Frequency::Weekly, date(2024, 3, 4)))
            .await
            .unwrap();

        let report = processor.run(date(2024, 3, 4)).await.unwrap();
        assert_eq!(report.due, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(store.balance(AccountId(2)).await, Some(Decimal::from(100)));
    }

    #[tokio::test]
    async fn test_commit_failure_counts_as_error_and_keeps_schedule_due() {
        let (processor, store, _) = setup(
            vec![account(1, Currency::Rub, 500), account(2, Currency::Rub, 0)],
            FatalFailureAction::Reschedule,
        )
        .await;
        let schedule = store
            .create_schedule(new_schedule(1, 2, 100, Frequency::Monthly, date(2024, 3, 4)))
            .await
            .unwrap();
        store.set_fail_commit(true);

        let report = processor.run(date(2024, 3, 4)).await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.succeeded, 0);

        store.set_fail_commit(false);
        let reloaded = store.schedule(schedule.schedule_id).await.unwrap().unwrap();
        assert_eq!(reloaded.next_occurrence_date, Some(date(2024, 3, 4)));
        assert_eq!(store.balance(AccountId(1)).await, Some(Decimal::from(500)));
    }

    #[tokio::test]
    async fn test_success_publishes_event() {
        let (processor, store, _) = setup(
            vec![account(1, Currency::Rub, 500), account(2, Currency::Rub, 0)],
            FatalFailureAction::Reschedule,
        )
        .await;
        let mut rx = processor.ledger.events().subscribe();
        store
            .create_schedule(new_schedule(1, 2, 100, Frequency::Once, date(2024, 3, 4)))
            .await
            .unwrap();

        processor.run(date(2024, 3, 4)).await.unwrap();

        match rx.recv().await.unwrap() {
            LedgerEvent::TransactionCommitted(tx) => {
                assert_eq!(tx.amount, Decimal::from(100));
                assert_eq!(tx.description, "allowance");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
