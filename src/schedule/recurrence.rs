//! Recurrence Calculator
//!
//! Pure calendar math for repeating schedules. Nothing here touches a
//! schedule; callers apply the returned date themselves.
//!
//! Month and year steps land on the anchor day (day of month of the first
//! occurrence), clamped to the last day of shorter months:
//!
//! ```text
//! anchor 31:  Jan 31 -> Feb 28 -> Mar 31 -> Apr 30 -> May 31
//! anchor 29:  2024-02-29 -> 2025-02-28 -> ... -> 2028-02-29   (annually)
//! ```

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How often a scheduled transfer repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    Once,
    Daily,
    Weekly,
    BiWeekly,
    Monthly,
    Annually,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Once => "once",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::BiWeekly => "bi-weekly",
            Frequency::Monthly => "monthly",
            Frequency::Annually => "annually",
        }
    }

    #[inline]
    pub fn is_recurring(&self) -> bool {
        *self != Frequency::Once
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(Frequency::Once),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "bi-weekly" => Ok(Frequency::BiWeekly),
            "monthly" => Ok(Frequency::Monthly),
            "annually" => Ok(Frequency::Annually),
            other => Err(format!("Invalid frequency: {}", other)),
        }
    }
}

/// Next occurrence strictly after `today`, starting from `from`
///
/// Missed cycles are skipped, not replayed: the date is advanced one unit
/// at a time until it is in the future. Returns `None` when the series is
/// over: `Once` schedules, or a candidate past `end_date`.
pub fn next_occurrence(
    frequency: Frequency,
    anchor_day: u32,
    from: NaiveDate,
    end_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    if !frequency.is_recurring() {
        return None;
    }

    let past_end = |date: NaiveDate| end_date.is_some_and(|end| date > end);

    let mut next = from;
    while next <= today {
        next = advance(frequency, anchor_day, next)?;
        if past_end(next) {
            return None;
        }
    }

    if past_end(next) { None } else { Some(next) }
}

/// Advance `date` by exactly one unit of `frequency`
pub fn advance(frequency: Frequency, anchor_day: u32, date: NaiveDate) -> Option<NaiveDate> {
    match frequency {
        Frequency::Once => None,
        Frequency::Daily => date.checked_add_days(Days::new(1)),
        Frequency::Weekly => date.checked_add_days(Days::new(7)),
        Frequency::BiWeekly => date.checked_add_days(Days::new(14)),
        Frequency::Monthly => {
            let (year, month) = if date.month() == 12 {
                (date.year() + 1, 1)
            } else {
                (date.year(), date.month() + 1)
            };
            on_anchor_day(year, month, anchor_day)
        }
        Frequency::Annually => on_anchor_day(date.year() + 1, date.month(), anchor_day),
    }
}

/// Number of days in `month` of `year`
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?
        .pred_opt()
        .map(|last| last.day())
}

fn on_anchor_day(year: i32, month: u32, anchor_day: u32) -> Option<NaiveDate> {
    let day = anchor_day.clamp(1, days_in_month(year, month)?);
    NaiveDate::from_ymd_opt(year, month, day)
}
