//! Contribution scheduling - Turns a group's configuration into dated obligations.
//!
//! Scheduling is pure: it computes the sequence of obligations for a horizon of periods
//! and leaves persistence to the ledger store. Every period is pooled: each member owes
//! one contribution and the member whose rotation position matches the period receives
//! the pot. Due dates are always computed from the group's original start date so that
//! monthly schedules keep their day of month (Jan 31 → Feb 29 → Mar 31).

use crate::errors::{Error, Result};
use chrono::{Days, Months, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// How often contributions fall due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    /// Every 7 days
    Weekly,
    /// Every 14 days
    Biweekly,
    /// Same day every calendar month, clamped to the month's length
    Monthly,
}

impl Frequency {
    /// Database and config representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
        }
    }

    /// Due date of period `index` counted from `start`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] if the date falls outside chrono's range.
    pub fn due_date(self, start: NaiveDate, index: u32) -> Result<NaiveDate> {
        let due = match self {
            Self::Weekly => start.checked_add_days(Days::new(7 * u64::from(index))),
            Self::Biweekly => start.checked_add_days(Days::new(14 * u64::from(index))),
            Self::Monthly => start.checked_add_months(Months::new(index)),
        };
        due.ok_or_else(|| {
            Error::invalid_config(
                "start_date",
                format!("period {index} from {start} is out of the supported date range"),
            )
        })
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "biweekly" => Ok(Self::Biweekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(Error::invalid_config(
                "frequency",
                format!("unknown frequency {other:?}, expected weekly, biweekly or monthly"),
            )),
        }
    }
}

/// Parses an ISO-8601 calendar date (`YYYY-MM-DD`).
///
/// # Errors
/// Returns [`Error::InvalidConfiguration`] naming `field` when the value does not parse.
pub fn parse_calendar_date(field: &'static str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| Error::invalid_config(field, format!("{value:?} is not a valid date: {e}")))
}

/// Everything the scheduler needs to know about a group.
#[derive(Debug, Clone)]
pub struct SchedulePlan<'a> {
    /// Due date of the group's very first period
    pub start_date: NaiveDate,
    /// Contribution frequency
    pub frequency: Frequency,
    /// Contribution per member per period, in minor units
    pub contribution_amount: i64,
    /// Member ids in rotation order
    pub member_ids: &'a [i64],
    /// Global index of the first period to generate (`cycle * member_count`)
    pub first_period: u32,
}

/// A contribution the scheduler has planned but the store has not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledObligation {
    /// Member who owes the contribution
    pub member_id: i64,
    /// Period relative to the start of the horizon
    pub period_index: u32,
    /// Calendar due date
    pub due_date: NaiveDate,
    /// Amount owed in minor units
    pub amount_owed: i64,
}

/// Generates the obligations for `horizon` periods, ordered by due date and then by
/// rotation order within a period.
///
/// # Errors
/// Returns [`Error::InvalidConfiguration`] when the group has fewer than two members,
/// the contribution amount is not positive, the horizon is zero or longer than one full
/// rotation, or a due date overflows.
pub fn generate_obligations(
    plan: &SchedulePlan<'_>,
    horizon: u32,
) -> Result<Vec<ScheduledObligation>> {
    let member_count = u32::try_from(plan.member_ids.len())?;
    if member_count < 2 {
        return Err(Error::invalid_config(
            "member_count",
            format!("a savings group needs at least 2 members, got {member_count}"),
        ));
    }
    if plan.contribution_amount <= 0 {
        return Err(Error::invalid_config(
            "contribution_amount",
            format!(
                "contribution must be positive, got {}",
                plan.contribution_amount
            ),
        ));
    }
    if horizon == 0 || horizon > member_count {
        return Err(Error::invalid_config(
            "horizon",
            format!("horizon must be between 1 and {member_count} periods, got {horizon}"),
        ));
    }

    let mut obligations = Vec::with_capacity(plan.member_ids.len() * horizon as usize);
    for period_index in 0..horizon {
        let global_period = plan.first_period.checked_add(period_index).ok_or_else(|| {
            Error::invalid_config("horizon", "period index overflow".to_string())
        })?;
        let due_date = plan.frequency.due_date(plan.start_date, global_period)?;

        obligations.extend(plan.member_ids.iter().map(|&member_id| ScheduledObligation {
            member_id,
            period_index,
            due_date,
            amount_owed: plan.contribution_amount,
        }));
    }

    Ok(obligations)
}
