//! Interest accrual formula
//!
//! ```text
//! first cycle:  min_balance = balance, interest = 0, clear first-deposit flag
//! otherwise:    interest    = round(min(min_balance, cap) * rate)
//!               balance    += interest
//!               min_balance = min(balance, cap)
//! both:         next_interest_date advanced by one period (anchor = opening day)
//! ```

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::types::SavingsAccount;
use crate::money::round_minor;
use crate::schedule::recurrence;

/// One accrual cycle, computed but not yet applied
#[derive(Debug, Clone, PartialEq)]
pub struct Accrual {
    pub interest: Decimal,
    /// Interest base used this cycle
    pub base: Decimal,
    pub new_balance: Decimal,
    pub min_balance: Decimal,
    pub next_interest_date: Option<NaiveDate>,
    pub first_cycle: bool,
}

/// Compute one accrual for `savings` whose account currently holds `balance`
pub fn accrue(
    savings: &SavingsAccount,
    balance: Decimal,
    accrual_cap: Decimal,
    today: NaiveDate,
) -> Accrual {
    let from = savings.next_interest_date.unwrap_or(today);
    let next_interest_date = recurrence::next_occurrence(
        savings.interest_period.frequency(),
        savings.anchor_day(),
        from,
        None,
        today,
    );

    if savings.is_first_deposit {
        return Accrual {
            interest: Decimal::ZERO,
            base: Decimal::ZERO,
            new_balance: balance,
            min_balance: balance,
            next_interest_date,
            first_cycle: true,
        };
    }

    let base = savings.min_balance.min(accrual_cap);
    let interest = round_minor(base * savings.interest_rate);
    let new_balance = balance + interest;

    Accrual {
        interest,
        base,
        new_balance,
        min_balance: new_balance.min(accrual_cap),
        next_interest_date,
        first_cycle: false,
    }
}

impl SavingsAccount {
    /// Record a computed accrual on the savings terms
    pub fn apply(&mut self, accrual: &Accrual) {
        self.min_balance = accrual.min_balance;
        self.next_interest_date = accrual.next_interest_date;
        self.is_first_deposit = false;
    }
}
