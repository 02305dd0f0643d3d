//! Daily Worker
//!
//! In-process stand-in for the external cron trigger: runs the scheduled
//! transfer processor, then the savings interest processor, for the local
//! date, once per interval.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::savings::{AccrualReport, SavingsInterestProcessor};
use crate::schedule::{ProcessingReport, ScheduledTransferProcessor};

/// Configuration for the daily worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to run both processors
    pub run_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            run_interval: Duration::from_secs(86_400),
        }
    }
}

/// Result of one daily run
///
/// A processor whose run failed as a whole has no report; its error is in
/// `errors`. Per-item failures are counted inside the reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub transfers: Option<ProcessingReport>,
    pub interest: Option<AccrualReport>,
    pub errors: Vec<String>,
}

impl DailyReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct DailyWorker {
    transfers: Arc<ScheduledTransferProcessor>,
    savings: Arc<SavingsInterestProcessor>,
    config: WorkerConfig,
}

impl DailyWorker {
    pub fn new(
        transfers: Arc<ScheduledTransferProcessor>,
        savings: Arc<SavingsInterestProcessor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            transfers,
            savings,
            config,
        }
    }

    /// Run forever, one pass per interval
    pub async fn run(&self) -> ! {
        info!(
            run_interval_secs = self.config.run_interval.as_secs(),
            "Starting daily worker"
        );

        loop {
            let today = Local::now().date_naive();
            self.run_once(today).await;
            tokio::time::sleep(self.config.run_interval).await;
        }
    }

    /// Run both processors for `today`
    ///
    /// A failing transfer run does not prevent interest accrual.
    pub async fn run_once(&self, today: NaiveDate) -> DailyReport {
        let mut errors = Vec::new();

        let transfers = match self.transfers.run(today).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(%today, error = %e, "Scheduled transfer run failed");
                errors.push(format!("scheduled transfers: {}", e));
                None
            }
        };
        let interest = match self.savings.run(today).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(%today, error = %e, "Interest run failed");
                errors.push(format!("interest: {}", e));
                None
            }
        };

        DailyReport {
            date: today,
            transfers,
            interest,
            errors,
        }
    }
}
