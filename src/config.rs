use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

use crate::ledger::error::{DEFAULT_RECOVERABLE_CODES, ERROR_CODES};
use crate::schedule::policy::FatalFailureAction;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL (overridden by `DATABASE_URL`)
    #[serde(default)]
    pub postgres_url: Option<String>,
    pub currency: CurrencyApiConfig,
    pub savings: SavingsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// External exchange-rate provider
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CurrencyApiConfig {
    /// Overridden by `CURRENCY_API`
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Upper bound for one rate request; a timeout counts as conversion unavailable
    #[serde(default = "default_rate_timeout_ms")]
    pub timeout_ms: u64,
    /// 0 disables the rate cache
    #[serde(default)]
    pub cache_ttl_secs: u64,
}

fn default_rate_timeout_ms() -> u64 {
    5000
}

/// Savings interest parameters, snapshotted into each savings account at opening
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SavingsConfig {
    /// Maximum balance interest is computed on
    pub accrual_cap: Decimal,
    pub rate_monthly: Decimal,
    pub rate_yearly: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Daemon cadence
    #[serde(default = "default_run_interval_secs")]
    pub run_interval_secs: u64,
    /// What happens to a schedule whose transfer failed fatally
    #[serde(default)]
    pub fatal_failure_action: FatalFailureAction,
    /// Ledger error codes that reschedule instead of taking the fatal action
    #[serde(default = "default_recoverable_errors")]
    pub recoverable_errors: Vec<String>,
}

fn default_recoverable_errors() -> Vec<String> {
    DEFAULT_RECOVERABLE_CODES
        .iter()
        .map(|code| code.to_string())
        .collect()
}

fn default_run_interval_secs() -> u64 {
    86_400
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_interval_secs: default_run_interval_secs(),
            fatal_failure_action: FatalFailureAction::default(),
            recoverable_errors: default_recoverable_errors(),
        }
    }
}

impl AppConfig {
    /// Load `config/<env>.yaml`, then apply environment overrides
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.postgres_url = Some(url);
        }
        if let Ok(url) = std::env::var("CURRENCY_API") {
            config.currency.api_url = url;
        }

        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.savings.accrual_cap < Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "savings.accrual_cap must not be negative".to_string(),
            ));
        }
        if self.savings.rate_monthly < Decimal::ZERO || self.savings.rate_yearly < Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "savings interest rates must not be negative".to_string(),
            ));
        }
        if self.scheduler.run_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.run_interval_secs must be positive".to_string(),
            ));
        }
        if let Some(code) = self
            .scheduler
            .recoverable_errors
            .iter()
            .find(|code| !ERROR_CODES.contains(&code.as_str()))
        {
            return Err(ConfigError::Invalid(format!(
                "scheduler.recoverable_errors: unknown error code {}",
                code
            )));
        }
        Ok(())
    }
}
