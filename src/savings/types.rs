use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::account::{Account, AccountId};
use crate::config::SavingsConfig;
use crate::schedule::recurrence::{self, Frequency};

/// How often interest is paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterestPeriod {
    Monthly,
    Yearly,
}

impl InterestPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterestPeriod::Monthly => "monthly",
            InterestPeriod::Yearly => "yearly",
        }
    }

    /// Recurrence used to advance `next_interest_date`
    pub fn frequency(&self) -> Frequency {
        match self {
            InterestPeriod::Monthly => Frequency::Monthly,
            InterestPeriod::Yearly => Frequency::Annually,
        }
    }
}

impl fmt::Display for InterestPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterestPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(InterestPeriod::Monthly),
            "yearly" => Ok(InterestPeriod::Yearly),
            other => Err(format!("Invalid interest period: {}", other)),
        }
    }
}

/// Configured interest rates per period
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterestRates {
    pub monthly: Decimal,
    pub yearly: Decimal,
}

impl InterestRates {
    pub fn rate_for(&self, period: InterestPeriod) -> Decimal {
        match period {
            InterestPeriod::Monthly => self.monthly,
            InterestPeriod::Yearly => self.yearly,
        }
    }
}

impl From<&SavingsConfig> for InterestRates {
    fn from(config: &SavingsConfig) -> Self {
        Self {
            monthly: config.rate_monthly,
            yearly: config.rate_yearly,
        }
    }
}

/// Savings extension of an account (one-to-one)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsAccount {
    pub account_id: AccountId,
    pub goal_name: String,
    pub goal_amount: Decimal,
    /// Balance interest is computed on at the next accrual
    pub min_balance: Decimal,
    /// Snapshotted from configuration at opening, never changed afterwards
    pub interest_rate: Decimal,
    pub interest_period: InterestPeriod,
    pub next_interest_date: Option<NaiveDate>,
    /// Grace cycle: the first accrual only captures the deposit baseline
    pub is_first_deposit: bool,
    /// Day the underlying account was opened; anchors the accrual dates
    pub opened_on: NaiveDate,
}

impl SavingsAccount {
    /// Savings terms for a freshly opened `account`
    pub fn open(
        account: &Account,
        goal_name: impl Into<String>,
        goal_amount: Decimal,
        interest_period: InterestPeriod,
        rates: &InterestRates,
    ) -> Self {
        let opened_on = account.opened_on();
        Self {
            account_id: account.account_id,
            goal_name: goal_name.into(),
            goal_amount,
            min_balance: Decimal::ZERO,
            interest_rate: rates.rate_for(interest_period),
            interest_period,
            next_interest_date: recurrence::advance(
                interest_period.frequency(),
                opened_on.day(),
                opened_on,
            ),
            is_first_deposit: true,
            opened_on,
        }
    }

    #[inline]
    pub fn anchor_day(&self) -> u32 {
        self.opened_on.day()
    }

    /// Progress towards the goal, in percent (capped at 100)
    pub fn goal_progress(&self, balance: Decimal) -> Decimal {
        if self.goal_amount <= Decimal::ZERO {
            return Decimal::ONE_HUNDRED;
        }
        (balance * Decimal::ONE_HUNDRED / self.goal_amount)
            .min(Decimal::ONE_HUNDRED)
            .round_dp(2)
    }
}
