//! family-ledger - periodic jobs of the family banking ledger
//!
//! ```text
//! family-ledger [--env dev] migrate
//! family-ledger [--env dev] run-scheduled   [--date YYYY-MM-DD]
//! family-ledger [--env dev] accrue-interest [--date YYYY-MM-DD]
//! family-ledger [--env dev] run-daily       [--date YYYY-MM-DD]
//! family-ledger [--env dev] daemon
//! ```
//!
//! Intended to be invoked by cron once a day, or run as a daemon.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use family_ledger::config::AppConfig;
use family_ledger::converter::{CurrencyConverter, HttpRateProvider};
use family_ledger::ledger::{EventBus, LedgerEngine};
use family_ledger::logging::init_logging;
use family_ledger::savings::SavingsInterestProcessor;
use family_ledger::schedule::{FailurePolicy, ScheduledTransferProcessor};
use family_ledger::store::{PgStore, Store};
use family_ledger::worker::{DailyWorker, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "family-ledger", version, about = "Family banking ledger jobs")]
struct Cli {
    /// Configuration profile: loads config/<env>.yaml
    #[arg(long, global = true, default_value = "dev")]
    env: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database schema
    Migrate,
    /// Execute scheduled transfers due on the given date (default today)
    RunScheduled {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Accrue savings interest due on the given date (default today)
    AccrueInterest {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Scheduled transfers, then interest
    RunDaily {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Run the daily jobs every `scheduler.run_interval_secs`
    Daemon,
}

/// Wired-up engine components
struct App {
    store: PgStore,
    transfers: Arc<ScheduledTransferProcessor>,
    savings: Arc<SavingsInterestProcessor>,
}

impl App {
    async fn build(config: &AppConfig) -> Result<Self> {
        let url = config
            .postgres_url
            .as_deref()
            .context("postgres_url is not configured (set DATABASE_URL)")?;
        let store = PgStore::connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        let shared: Arc<dyn Store> = Arc::new(store.clone());

        let provider = HttpRateProvider::from_config(&config.currency)
            .context("Failed to build rate provider")?;
        let converter = Arc::new(CurrencyConverter::with_cache(
            Arc::new(provider),
            config.currency.cache_ttl_secs,
        ));

        let events = EventBus::default();
        let ledger = Arc::new(LedgerEngine::new(shared.clone(), converter, events.clone()));
        let transfers = Arc::new(ScheduledTransferProcessor::new(
            ledger,
            FailurePolicy::new(config.scheduler.fatal_failure_action)
                .with_recoverable(config.scheduler.recoverable_errors.iter().cloned()),
        ));
        let savings = Arc::new(SavingsInterestProcessor::new(
            shared,
            events,
            config.savings.accrual_cap,
        ));

        Ok(Self {
            store,
            transfers,
            savings,
        })
    }

    fn worker(&self, config: &AppConfig) -> DailyWorker {
        DailyWorker::new(
            self.transfers.clone(),
            self.savings.clone(),
            WorkerConfig {
                run_interval: Duration::from_secs(config.scheduler.run_interval_secs),
            },
        )
    }
}

fn print_report<T: Serialize>(report: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.env)
        .with_context(|| format!("Failed to load configuration for env '{}'", cli.env))?;
    let _guard = init_logging(&config);
    info!(env = %cli.env, command = ?cli.command, "family-ledger starting");

    let app = App::build(&config).await?;
    let today = |date: Option<NaiveDate>| date.unwrap_or_else(|| Local::now().date_naive());

    match cli.command {
        Command::Migrate => {
            app.store.migrate().await?;
        }
        Command::RunScheduled { date } => {
            let report = app.transfers.run(today(date)).await?;
            print_report(&report)?;
        }
        Command::AccrueInterest { date } => {
            let report = app.savings.run(today(date)).await?;
            print_report(&report)?;
        }
        Command::RunDaily { date } => {
            let report = app.worker(&config).run_once(today(date)).await;
            print_report(&report)?;
            if !report.is_complete() {
                anyhow::bail!("Daily run incomplete: {}", report.errors.join("; "));
            }
        }
        Command::Daemon => {
            app.worker(&config).run().await;
        }
    }

    Ok(())
}
