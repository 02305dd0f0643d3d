//! Savings Interest Processor
//!
//! Same periodic-job shape as the scheduled-transfer processor: one unit of
//! work per savings account whose interest date is today; a failure is
//! logged and the run moves on.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::interest::{Accrual, accrue};
use crate::account::AccountId;
use crate::ledger::{EventBus, LedgerEvent};
use crate::store::{Store, StoreError};

/// Counters for one accrual run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccrualReport {
    pub due: usize,
    /// Accounts credited with interest
    pub accrued: usize,
    /// First cycles that only captured the deposit baseline
    pub baselined: usize,
    /// Non-first cycles that paid zero interest
    pub zero: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total_interest: Decimal,
}

pub struct SavingsInterestProcessor {
    store: Arc<dyn Store>,
    events: EventBus,
    accrual_cap: Decimal,
}

impl SavingsInterestProcessor {
    pub fn new(store: Arc<dyn Store>, events: EventBus, accrual_cap: Decimal) -> Self {
        Self {
            store,
            events,
            accrual_cap,
        }
    }

    pub async fn run(&self, today: NaiveDate) -> Result<AccrualReport, StoreError> {
        let ids = self.store.due_savings_ids(today).await?;
        let mut report = AccrualReport {
            due: ids.len(),
            ..Default::default()
        };

        if ids.is_empty() {
            debug!(%today, "No savings accounts due for interest");
            return Ok(report);
        }

        for id in ids {
            match self.process(id, today).await {
                Ok(Some(accrual)) if accrual.first_cycle => {
                    report.baselined += 1;
                    debug!(account_id = %id, min_balance = %accrual.min_balance, "Savings baseline captured");
                }
                Ok(Some(accrual)) if accrual.interest > Decimal::ZERO => {
                    report.accrued += 1;
                    report.total_interest += accrual.interest;
                    info!(
                        account_id = %id,
                        interest = %accrual.interest,
                        base = %accrual.base,
                        balance = %accrual.new_balance,
                        "Interest accrued"
                    );
                }
                Ok(Some(_)) => report.zero += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.errors += 1;
                    error!(account_id = %id, error = %e, "Failed to accrue interest");
                }
            }
        }

        info!(
            due = report.due,
            accrued = report.accrued,
            baselined = report.baselined,
            skipped = report.skipped,
            errors = report.errors,
            total_interest = %report.total_interest,
            "Interest run complete"
        );
        Ok(report)
    }

    async fn process(&self, id: AccountId, today: NaiveDate) -> Result<Option<Accrual>, StoreError> {
        let mut uow = self.store.begin().await?;
        let Some((mut savings, account)) = uow.claim_due_savings(id, today).await? else {
            uow.rollback().await?;
            return Ok(None);
        };

        let accrual = accrue(&savings, account.balance, self.accrual_cap, today);
        if accrual.interest > Decimal::ZERO {
            uow.set_balance(account.account_id, accrual.new_balance)
                .await?;
        }
        savings.apply(&accrual);
        uow.update_savings(&savings).await?;
        uow.commit().await?;

        debug!(
            account_id = %id,
            goal = %savings.goal_name,
            progress_pct = %savings.goal_progress(accrual.new_balance),
            "Savings goal progress"
        );
        if accrual.interest > Decimal::ZERO {
            self.events.publish(LedgerEvent::InterestAccrued {
                account_id: id,
                amount: accrual.interest,
                on: today,
            });
        }
        Ok(Some(accrual))
    }
}
