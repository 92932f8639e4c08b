//! Payment processing - Applies payment events to obligations.
//!
//! Every payment is appended as an immutable event inside a database transaction. The
//! `(obligation_id, idempotency_key)` unique index makes application at-most-once: a
//! repeated key returns the earlier result instead of writing a second event, including
//! when two submissions race and the index rejects the loser's insert.

use crate::{
    config::settings::LedgerSettings,
    core::{
        group::{self, GroupStatus},
        ledger::{self, NewPaymentEvent},
        obligation::{self, ObligationSnapshot},
    },
    entities::payment_event,
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, DatabaseConnection, SqlErr, TransactionTrait};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// A payment submitted against one obligation.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Obligation being paid
    pub obligation_id: i64,
    /// Amount in minor units
    pub amount: i64,
    /// Payment method tag
    pub method: String,
    /// Client-supplied key; resubmitting the same key never applies twice
    pub idempotency_key: String,
    /// When the payment was made
    pub paid_at: DateTime<Utc>,
}

/// Result of applying a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum PaymentOutcome {
    /// A new payment event was recorded
    Applied {
        /// The new event
        event: payment_event::Model,
        /// Obligation state after the payment
        snapshot: ObligationSnapshot,
    },
    /// The idempotency key was already used; nothing was written
    Duplicate {
        /// The event recorded by the first submission
        event: payment_event::Model,
        /// Current obligation state
        snapshot: ObligationSnapshot,
    },
}

impl PaymentOutcome {
    /// Obligation state after the request, whichever way it went.
    #[must_use]
    pub const fn snapshot(&self) -> &ObligationSnapshot {
        match self {
            Self::Applied { snapshot, .. } | Self::Duplicate { snapshot, .. } => snapshot,
        }
    }

    /// The payment event behind this outcome.
    #[must_use]
    pub const fn event(&self) -> &payment_event::Model {
        match self {
            Self::Applied { event, .. } | Self::Duplicate { event, .. } => event,
        }
    }

    /// Whether the request was a replay of an earlier submission.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

fn validate_request(settings: &LedgerSettings, request: &PaymentRequest) -> Result<()> {
    if request.amount <= 0 {
        return Err(Error::InvalidAmount {
            amount: request.amount,
        });
    }
    if request.idempotency_key.trim().is_empty() {
        return Err(Error::InvalidPayment {
            field: "idempotency_key",
            message: "an idempotency key is required".to_string(),
        });
    }
    if !settings.accepts_method(&request.method) {
        return Err(Error::InvalidPayment {
            field: "method",
            message: format!(
                "unsupported payment method {:?}, expected one of {:?}",
                request.method, settings.payment_methods
            ),
        });
    }
    Ok(())
}

fn is_unique_violation(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => matches!(
            db_err.sql_err(),
            Some(SqlErr::UniqueConstraintViolation(_))
        ),
        _ => false,
    }
}

/// Applies a payment to an obligation.
///
/// Late payments (made after the due date while the obligation was not yet satisfied)
/// set the obligation's `was_late` flag, even when the payment itself is then rejected.
///
/// # Errors
/// - [`Error::InvalidAmount`] / [`Error::InvalidPayment`] for a malformed request, or (with
///   overpayment allowed) an amount that would push the obligation's total past `i64::MAX`
/// - [`Error::UnknownObligation`] if the obligation does not exist
/// - [`Error::GroupNotActive`] if the obligation's group has been closed
/// - [`Error::OverpaymentRejected`] if the payment exceeds what is owed plus tolerance
#[instrument(
    skip(db, settings, request),
    fields(obligation_id = request.obligation_id, key = %request.idempotency_key)
)]
pub async fn apply_payment(
    db: &DatabaseConnection,
    settings: &LedgerSettings,
    request: &PaymentRequest,
) -> Result<PaymentOutcome> {
    validate_request(settings, request)?;

    let result = try_apply_payment(db, settings, request).await;
    resolve_key_conflict(db, request, result).await
}

/// Turns a lost race on the idempotency index into the winner's [`PaymentOutcome::Duplicate`].
/// Any other result passes through unchanged.
async fn resolve_key_conflict(
    db: &DatabaseConnection,
    request: &PaymentRequest,
    result: Result<PaymentOutcome>,
) -> Result<PaymentOutcome> {
    match result {
        Err(err) if is_unique_violation(&err) => {
            warn!("Concurrent submission won the idempotency key; returning its result");
            replay(db, request)
                .await?
                .ok_or(Error::UnknownObligation {
                    obligation_id: request.obligation_id,
                })
        }
        other => other,
    }
}

async fn replay(
    db: &DatabaseConnection,
    request: &PaymentRequest,
) -> Result<Option<PaymentOutcome>> {
    let Some(event) =
        ledger::find_payment_by_key(db, request.obligation_id, &request.idempotency_key).await?
    else {
        return Ok(None);
    };
    let snapshot = snapshot_after(db, request.obligation_id, request.paid_at).await?;
    Ok(Some(PaymentOutcome::Duplicate { event, snapshot }))
}

async fn try_apply_payment(
    db: &DatabaseConnection,
    settings: &LedgerSettings,
    request: &PaymentRequest,
) -> Result<PaymentOutcome> {
    let txn = db.begin().await?;

    let obligation = ledger::get_obligation_by_id(&txn, request.obligation_id)
        .await?
        .ok_or(Error::UnknownObligation {
            obligation_id: request.obligation_id,
        })?;

    if let Some(event) =
        ledger::find_payment_by_key(&txn, obligation.id, &request.idempotency_key).await?
    {
        if event.amount != request.amount {
            warn!(
                "Idempotency key reused with a different amount ({} vs {}); keeping the original",
                event.amount, request.amount
            );
        }
        let snapshot = snapshot_after(&txn, obligation.id, request.paid_at).await?;
        txn.commit().await?;
        debug!("Duplicate payment for obligation {}", obligation.id);
        return Ok(PaymentOutcome::Duplicate { event, snapshot });
    }

    let group = group::require_group(&txn, obligation.group_id).await?;
    if GroupStatus::of(&group)? == GroupStatus::Closed {
        return Err(Error::GroupNotActive {
            group_id: group.id,
            status: group.status,
        });
    }

    // Everything already applied counts, regardless of its timestamp.
    let already_paid = ledger::get_payment_events_for_obligations(&txn, &[obligation.id])
        .await?
        .iter()
        .fold(0_i64, |total, e| total.saturating_add(e.amount));

    if obligation::is_late_payment(&obligation, already_paid, request.paid_at) {
        ledger::mark_obligation_late(&txn, obligation.id).await?;
    }

    let limit = obligation
        .amount_owed
        .saturating_add(settings.overpayment_tolerance);
    let rejection = match already_paid.checked_add(request.amount) {
        Some(total) if settings.allow_overpayment || total <= limit => None,
        None if settings.allow_overpayment => Some(Error::InvalidAmount {
            amount: request.amount,
        }),
        _ => Some(Error::OverpaymentRejected {
            owed: obligation.amount_owed,
            already_paid,
            attempted: request.amount,
            tolerance: settings.overpayment_tolerance,
        }),
    };
    if let Some(err) = rejection {
        // Commit the late flag; lateness does not depend on this payment succeeding.
        txn.commit().await?;
        return Err(err);
    }

    let event = ledger::insert_payment_event(
        &txn,
        &NewPaymentEvent {
            obligation_id: obligation.id,
            amount: request.amount,
            paid_at: request.paid_at,
            method: &request.method,
            idempotency_key: &request.idempotency_key,
        },
    )
    .await?;

    let snapshot = snapshot_after(&txn, obligation.id, request.paid_at).await?;
    txn.commit().await?;

    info!(
        "Applied payment {} of {} to obligation {} (status {})",
        event.id, event.amount, obligation.id, snapshot.status
    );
    Ok(PaymentOutcome::Applied { event, snapshot })
}

/// Snapshot that includes every applied payment, taken no earlier than `paid_at`.
async fn snapshot_after<C>(
    db: &C,
    obligation_id: i64,
    paid_at: DateTime<Utc>,
) -> Result<ObligationSnapshot>
where
    C: ConnectionTrait,
{
    let latest = ledger::get_payment_events_for_obligations(db, &[obligation_id])
        .await?
        .iter()
        .map(|e| e.paid_at)
        .max();
    let as_of = latest.map_or(paid_at, |latest| latest.max(paid_at));
    ledger::load_obligation_snapshot(db, obligation_id, as_of).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::obligation::ObligationStatus;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_full_payment_marks_paid() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligation = first_obligation(&db, view.group.id).await?;

        let outcome = apply_payment(
            &db,
            &LedgerSettings::default(),
            &payment_request(obligation.id, 10_000, "pay-1", at(2024, 1, 1)),
        )
        .await?;

        assert!(!outcome.is_duplicate());
        assert_eq!(outcome.snapshot().status, ObligationStatus::Paid);
        assert_eq!(outcome.snapshot().paid_amount, 10_000);
        assert!(!outcome.snapshot().was_late());
        assert_eq!(outcome.event().method, "card");
        Ok(())
    }

    #[tokio::test]
    async fn test_same_key_applies_once() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligation = first_obligation(&db, view.group.id).await?;
        let settings = LedgerSettings::default();
        let request = payment_request(obligation.id, 4_000, "pay-1", at(2024, 1, 1));

        let first = apply_payment(&db, &settings, &request).await?;
        let second = apply_payment(&db, &settings, &request).await?;

        assert!(second.is_duplicate());
        assert_eq!(first.event(), second.event());
        assert_eq!(first.snapshot(), second.snapshot());

        let events = ledger::get_payment_events_for_obligations(&db, &[obligation.id]).await?;
        assert_eq!(events.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_reused_key_with_other_amount_keeps_original() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligation = first_obligation(&db, view.group.id).await?;
        let settings = LedgerSettings::default();

        let first = payment_request(obligation.id, 4_000, "k", at(2024, 1, 1));
        let original = apply_payment(&db, &settings, &first).await?;

        let changed = payment_request(obligation.id, 6_000, "k", at(2024, 1, 1));
        let replayed = apply_payment(&db, &settings, &changed).await?;

        assert!(replayed.is_duplicate());
        assert_eq!(replayed.event(), original.event());
        assert_eq!(replayed.event().amount, 4_000);
        assert_eq!(replayed.snapshot().paid_amount, 4_000);

        let events = ledger::get_payment_events_for_obligations(&db, &[obligation.id]).await?;
        assert_eq!(events.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_lost_key_race_resolves_to_the_winner() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligation = first_obligation(&db, view.group.id).await?;
        let request = payment_request(obligation.id, 4_000, "race", at(2024, 1, 1));
        let winner = apply_payment(&db, &LedgerSettings::default(), &request).await?;

        // The insert a second submission makes after both passed the key lookup
        let conflict = ledger::insert_payment_event(
            &db,
            &NewPaymentEvent {
                obligation_id: obligation.id,
                amount: request.amount,
                paid_at: request.paid_at,
                method: &request.method,
                idempotency_key: &request.idempotency_key,
            },
        )
        .await
        .unwrap_err();
        assert!(is_unique_violation(&conflict));

        let outcome = resolve_key_conflict(&db, &request, Err(conflict)).await?;
        assert!(outcome.is_duplicate());
        assert_eq!(outcome.event(), winner.event());
        assert_eq!(outcome.snapshot().paid_amount, 4_000);

        let unrelated =
            resolve_key_conflict(&db, &request, Err(Error::InvalidAmount { amount: 0 })).await;
        assert!(matches!(unrelated, Err(Error::InvalidAmount { amount: 0 })));

        let events = ledger::get_payment_events_for_obligations(&db, &[obligation.id]).await?;
        assert_eq!(events.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_same_key_on_other_obligation_is_independent() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligations = ledger::get_obligations_for_cycle(&db, view.group.id, 0).await?;
        let settings = LedgerSettings::default();

        let first = payment_request(obligations[0].id, 10_000, "k", at(2024, 1, 1));
        apply_payment(&db, &settings, &first).await?;
        let second = payment_request(obligations[1].id, 10_000, "k", at(2024, 1, 1));
        let other = apply_payment(&db, &settings, &second).await?;

        assert!(!other.is_duplicate());
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_payments_accumulate() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligation = first_obligation(&db, view.group.id).await?;
        let settings = LedgerSettings::default();

        let request = payment_request(obligation.id, 3_000, "a", at(2023, 12, 20));
        let first = apply_payment(&db, &settings, &request).await?;
        assert_eq!(first.snapshot().status, ObligationStatus::Pending);
        assert_eq!(first.snapshot().outstanding(), 7_000);

        let request = payment_request(obligation.id, 7_000, "b", at(2023, 12, 28));
        let second = apply_payment(&db, &settings, &request).await?;
        assert_eq!(second.snapshot().status, ObligationStatus::Paid);
        assert_eq!(second.snapshot().payments.len(), 2);
        assert_eq!(second.snapshot().paid_date(), Some(date(2023, 12, 28)));
        Ok(())
    }

    #[tokio::test]
    async fn test_overpayment_rejected_by_default() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligation = first_obligation(&db, view.group.id).await?;
        let settings = LedgerSettings::default();

        let request = payment_request(obligation.id, 10_001, "a", at(2024, 1, 1));
        assert!(matches!(
            apply_payment(&db, &settings, &request).await,
            Err(Error::OverpaymentRejected {
                owed: 10_000,
                already_paid: 0,
                attempted: 10_001,
                tolerance: 0
            })
        ));

        let request = payment_request(obligation.id, 10_000, "b", at(2024, 1, 1));
        apply_payment(&db, &settings, &request).await?;
        let request = payment_request(obligation.id, 1, "c", at(2024, 1, 1));
        assert!(matches!(
            apply_payment(&db, &settings, &request).await,
            Err(Error::OverpaymentRejected { .. })
        ));

        let events = ledger::get_payment_events_for_obligations(&db, &[obligation.id]).await?;
        assert_eq!(events.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_amount_near_i64_max_is_rejected_not_wrapped() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligations = ledger::get_obligations_for_cycle(&db, view.group.id, 0).await?;

        let settings = LedgerSettings::default();
        let penny = payment_request(obligations[0].id, 1, "a", at(2024, 1, 1));
        apply_payment(&db, &settings, &penny).await?;
        let huge = payment_request(obligations[0].id, i64::MAX, "b", at(2024, 1, 1));
        assert!(matches!(
            apply_payment(&db, &settings, &huge).await,
            Err(Error::OverpaymentRejected {
                already_paid: 1,
                attempted: i64::MAX,
                ..
            })
        ));

        let allowing = LedgerSettings {
            allow_overpayment: true,
            ..LedgerSettings::default()
        };
        let huge = payment_request(obligations[1].id, i64::MAX, "a", at(2024, 1, 1));
        let applied = apply_payment(&db, &allowing, &huge).await?;
        assert_eq!(applied.snapshot().paid_amount, i64::MAX);
        let penny = payment_request(obligations[1].id, 1, "b", at(2024, 1, 1));
        assert!(matches!(
            apply_payment(&db, &allowing, &penny).await,
            Err(Error::InvalidAmount { amount: 1 })
        ));

        let events = ledger::get_payment_events_for_obligations(&db, &[obligations[1].id]).await?;
        assert_eq!(events.len(), 1);

        let saved = ledger::total_applied_for_group(&db, view.group.id, at(2024, 1, 1)).await?;
        assert_eq!(saved, i64::MAX);
        Ok(())
    }

    #[tokio::test]
    async fn test_overpayment_tolerance_and_allowance() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligations = ledger::get_obligations_for_cycle(&db, view.group.id, 0).await?;

        let tolerant = LedgerSettings {
            overpayment_tolerance: 50,
            ..LedgerSettings::default()
        };
        let request = payment_request(obligations[0].id, 10_050, "a", at(2024, 1, 1));
        let within = apply_payment(&db, &tolerant, &request).await?;
        assert_eq!(within.snapshot().paid_amount, 10_050);

        let allowing = LedgerSettings {
            allow_overpayment: true,
            ..LedgerSettings::default()
        };
        let request = payment_request(obligations[1].id, 25_000, "a", at(2024, 1, 1));
        let excess = apply_payment(&db, &allowing, &request).await?;
        assert_eq!(excess.snapshot().paid_amount, 25_000);
        assert_eq!(excess.snapshot().status, ObligationStatus::Paid);
        Ok(())
    }

    #[tokio::test]
    async fn test_late_payment_sets_was_late() -> Result<()> {
        let db = setup_test_db().await?;
        let mut config = three_member_config("Mid-month");
        config.start_date = "2024-01-15".to_string();
        let details = crate::core::group::create_group(&db, &config, at(2024, 1, 1)).await?;
        let obligation = first_obligation(&db, details.group.id).await?;
        assert_eq!(obligation.due_date, date(2024, 1, 15));

        let outcome = apply_payment(
            &db,
            &LedgerSettings::default(),
            &payment_request(obligation.id, 10_000, "late", at(2024, 1, 20)),
        )
        .await?;

        assert_eq!(outcome.snapshot().status, ObligationStatus::Paid);
        assert!(outcome.snapshot().was_late());
        Ok(())
    }

    #[tokio::test]
    async fn test_late_flag_survives_rejected_payment() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligation = first_obligation(&db, view.group.id).await?;

        let result = apply_payment(
            &db,
            &LedgerSettings::default(),
            &payment_request(obligation.id, 20_000, "too-much", at(2024, 1, 5)),
        )
        .await;
        assert!(matches!(result, Err(Error::OverpaymentRejected { .. })));

        let snapshot = ledger::load_obligation_snapshot(&db, obligation.id, at(2024, 1, 5)).await?;
        assert!(snapshot.was_late());
        assert_eq!(snapshot.status, ObligationStatus::Late);
        Ok(())
    }

    #[tokio::test]
    async fn test_late_remainder_flags_partially_paid_obligation() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligation = first_obligation(&db, view.group.id).await?;
        let settings = LedgerSettings::default();

        let request = payment_request(obligation.id, 5_000, "a", at(2023, 12, 30));
        apply_payment(&db, &settings, &request).await?;
        let request = payment_request(obligation.id, 5_000, "b", at(2024, 1, 3));
        let outcome = apply_payment(&db, &settings, &request).await?;

        assert!(outcome.snapshot().is_paid());
        assert!(outcome.snapshot().was_late());
        Ok(())
    }

    #[tokio::test]
    async fn test_request_validation() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligation = first_obligation(&db, view.group.id).await?;
        let settings = LedgerSettings::default();

        let zero = payment_request(obligation.id, 0, "a", at(2024, 1, 1));
        assert!(matches!(
            apply_payment(&db, &settings, &zero).await,
            Err(Error::InvalidAmount { amount: 0 })
        ));
        let negative = payment_request(obligation.id, -10, "a", at(2024, 1, 1));
        assert!(matches!(
            apply_payment(&db, &settings, &negative).await,
            Err(Error::InvalidAmount { amount: -10 })
        ));
        let blank_key = payment_request(obligation.id, 100, "  ", at(2024, 1, 1));
        assert!(matches!(
            apply_payment(&db, &settings, &blank_key).await,
            Err(Error::InvalidPayment {
                field: "idempotency_key",
                ..
            })
        ));

        let mut crypto = payment_request(obligation.id, 100, "a", at(2024, 1, 1));
        crypto.method = "crypto".to_string();
        assert!(matches!(
            apply_payment(&db, &settings, &crypto).await,
            Err(Error::InvalidPayment { field: "method", .. })
        ));

        let unknown = payment_request(9_999, 100, "a", at(2024, 1, 1));
        assert!(matches!(
            apply_payment(&db, &settings, &unknown).await,
            Err(Error::UnknownObligation {
                obligation_id: 9_999
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_group_rejects_payments() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligation = first_obligation(&db, view.group.id).await?;
        crate::core::group::close_group(&db, view.group.id, at(2024, 1, 1)).await?;

        let result = apply_payment(
            &db,
            &LedgerSettings::default(),
            &payment_request(obligation.id, 10_000, "a", at(2024, 1, 1)),
        )
        .await;
        assert!(matches!(result, Err(Error::GroupNotActive { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_sum_invariant_never_exceeds_total() -> Result<()> {
        let (db, view) = setup_with_group().await?;
        let obligations = ledger::get_obligations_for_cycle(&db, view.group.id, 0).await?;
        let settings = LedgerSettings::default();

        let amounts = [10_000, 2_500, 7_500, 10_000, 4_000];
        let mut expected = 0;
        for (i, (obligation, amount)) in obligations.iter().zip(amounts).enumerate() {
            apply_payment(
                &db,
                &settings,
                &payment_request(obligation.id, amount, &format!("k{i}"), at(2023, 12, 31)),
            )
            .await?;
            expected += amount;
        }

        let extra = payment_request(obligations[0].id, 1, "extra", at(2023, 12, 31));
        assert!(matches!(
            apply_payment(&db, &settings, &extra).await,
            Err(Error::OverpaymentRejected { .. })
        ));

        let snapshots =
            ledger::load_cycle_snapshots(&db, view.group.id, 0, at(2024, 12, 31)).await?;
        let paid: i64 = snapshots.iter().map(|s| s.paid_amount).sum();
        let total: i64 = snapshots.iter().map(|s| s.obligation.amount_owed).sum();
        assert_eq!(paid, expected);
        assert!(paid <= total);
        Ok(())
    }
}
