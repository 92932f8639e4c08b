//! Obligation status derivation.
//!
//! An obligation's status is never stored. It is recomputed on every read from the
//! payment events applied to it and the point in time the caller asks about, so it can
//! never drift from the events that justify it.

use crate::entities::{obligation, payment_event};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// Payment status of an obligation at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObligationStatus {
    /// Not yet satisfied and not yet overdue
    Pending,
    /// Applied payments cover the amount owed
    Paid,
    /// Past the due date and not satisfied
    Late,
}

impl ObligationStatus {
    /// Derives the status from the amounts involved and the as-of date.
    ///
    /// Paying the full amount wins over lateness: a late obligation that is
    /// eventually settled reads as `Paid` (its lateness survives in `was_late`).
    #[must_use]
    pub fn derive(
        amount_owed: i64,
        paid_amount: i64,
        due_date: NaiveDate,
        as_of: NaiveDate,
    ) -> Self {
        if paid_amount >= amount_owed {
            Self::Paid
        } else if as_of > due_date {
            Self::Late
        } else {
            Self::Pending
        }
    }

    /// Lowercase name, as shown to callers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Late => "late",
        }
    }
}

impl fmt::Display for ObligationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a payment made at `paid_at` arrives late for an obligation that had only
/// `already_paid` applied to it.
#[must_use]
pub fn is_late_payment(
    obligation: &obligation::Model,
    already_paid: i64,
    paid_at: DateTime<Utc>,
) -> bool {
    paid_at.date_naive() > obligation.due_date && already_paid < obligation.amount_owed
}

/// An obligation together with the payments applied to it as of a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObligationSnapshot {
    /// The stored obligation
    pub obligation: obligation::Model,
    /// Payments applied up to the as-of time, oldest first
    pub payments: Vec<payment_event::Model>,
    /// Sum of `payments`
    pub paid_amount: i64,
    /// Derived status
    pub status: ObligationStatus,
}

impl ObligationSnapshot {
    /// Builds a snapshot, ignoring payments made after `as_of`.
    #[must_use]
    pub fn new(
        obligation: obligation::Model,
        payments: impl IntoIterator<Item = payment_event::Model>,
        as_of: DateTime<Utc>,
    ) -> Self {
        let mut payments: Vec<payment_event::Model> = payments
            .into_iter()
            .filter(|p| p.obligation_id == obligation.id && p.paid_at <= as_of)
            .collect();
        payments.sort_by_key(|p| (p.paid_at, p.id));

        let paid_amount = payments
            .iter()
            .fold(0_i64, |total, p| total.saturating_add(p.amount));
        let status = ObligationStatus::derive(
            obligation.amount_owed,
            paid_amount,
            obligation.due_date,
            as_of.date_naive(),
        );

        Self {
            obligation,
            payments,
            paid_amount,
            status,
        }
    }

    /// Audit flag: a payment arrived after the due date while the obligation was unpaid.
    #[must_use]
    pub const fn was_late(&self) -> bool {
        self.obligation.was_late
    }

    /// Whether the obligation is settled.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.status == ObligationStatus::Paid
    }

    /// Amount still owed, never negative.
    #[must_use]
    pub fn outstanding(&self) -> i64 {
        (self.obligation.amount_owed - self.paid_amount).max(0)
    }

    /// Date of the payment that brought the total up to the amount owed.
    #[must_use]
    pub fn paid_date(&self) -> Option<NaiveDate> {
        let mut running = 0;
        self.payments.iter().find_map(|p| {
            running = p.amount.saturating_add(running);
            (running >= self.obligation.amount_owed).then(|| p.paid_at.date_naive())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn obligation(due_date: NaiveDate) -> obligation::Model {
        obligation::Model {
            id: 1,
            group_id: 1,
            member_id: 1,
            cycle: 0,
            period_index: 0,
            due_date,
            amount_owed: 10_000,
            was_late: false,
            created_at: at(2024, 1, 1),
        }
    }

    fn payment(id: i64, amount: i64, paid_at: DateTime<Utc>) -> payment_event::Model {
        payment_event::Model {
            id,
            obligation_id: 1,
            amount,
            paid_at,
            method: "card".to_string(),
            idempotency_key: format!("key-{id}"),
        }
    }

    #[test]
    fn test_derive_status() {
        let due = date(2024, 1, 15);
        assert_eq!(
            ObligationStatus::derive(100, 0, due, date(2024, 1, 15)),
            ObligationStatus::Pending
        );
        assert_eq!(
            ObligationStatus::derive(100, 50, due, date(2024, 1, 16)),
            ObligationStatus::Late
        );
        assert_eq!(
            ObligationStatus::derive(100, 100, due, date(2024, 3, 1)),
            ObligationStatus::Paid
        );
        assert_eq!(
            ObligationStatus::derive(100, 150, due, date(2024, 1, 1)),
            ObligationStatus::Paid
        );
    }

    #[test]
    fn test_snapshot_ignores_future_payments() {
        let snapshot = ObligationSnapshot::new(
            obligation(date(2024, 1, 15)),
            vec![
                payment(2, 6_000, at(2024, 1, 20)),
                payment(1, 4_000, at(2024, 1, 10)),
            ],
            at(2024, 1, 12),
        );

        assert_eq!(snapshot.paid_amount, 4_000);
        assert_eq!(snapshot.status, ObligationStatus::Pending);
        assert_eq!(snapshot.outstanding(), 6_000);
        assert_eq!(snapshot.paid_date(), None);
    }

    #[test]
    fn test_snapshot_paid_date_is_the_settling_payment() {
        let snapshot = ObligationSnapshot::new(
            obligation(date(2024, 1, 15)),
            vec![
                payment(2, 6_000, at(2024, 1, 20)),
                payment(1, 4_000, at(2024, 1, 10)),
            ],
            at(2024, 2, 1),
        );

        assert!(snapshot.is_paid());
        assert_eq!(snapshot.payments[0].id, 1);
        assert_eq!(snapshot.paid_date(), Some(date(2024, 1, 20)));
        assert_eq!(snapshot.outstanding(), 0);
    }

    #[test]
    fn test_snapshot_late_until_paid() {
        let snapshot =
            ObligationSnapshot::new(obligation(date(2024, 1, 15)), Vec::new(), at(2024, 1, 16));
        assert_eq!(snapshot.status, ObligationStatus::Late);
        assert_eq!(snapshot.status.to_string(), "late");
    }

    #[test]
    fn test_is_late_payment() {
        let obligation = obligation(date(2024, 1, 15));
        assert!(!is_late_payment(&obligation, 0, at(2024, 1, 15)));
        assert!(is_late_payment(&obligation, 0, at(2024, 1, 20)));
        assert!(is_late_payment(&obligation, 9_999, at(2024, 1, 20)));
        assert!(!is_late_payment(&obligation, 10_000, at(2024, 1, 20)));
    }
}
