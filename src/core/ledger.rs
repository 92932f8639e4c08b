//! Ledger store - Storage and retrieval of obligations, payment events and payouts.
//!
//! Functions here own no business rules; they read and write rows by key. All of them
//! are generic over [`ConnectionTrait`] so they run equally on a plain connection or
//! inside a database transaction opened by the payment processor or rotation engine.

use crate::{
    core::{obligation::ObligationSnapshot, schedule::ScheduledObligation},
    entities::{Obligation, PaymentEvent, Payout, obligation, payment_event, payout},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use std::collections::HashMap;

/// Persists scheduled obligations for one cycle of a group.
pub async fn insert_obligations<C>(
    db: &C,
    group_id: i64,
    cycle: i32,
    scheduled: &[ScheduledObligation],
    created_at: DateTime<Utc>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    for item in scheduled {
        obligation::ActiveModel {
            group_id: Set(group_id),
            member_id: Set(item.member_id),
            cycle: Set(cycle),
            period_index: Set(i32::try_from(item.period_index)?),
            due_date: Set(item.due_date),
            amount_owed: Set(item.amount_owed),
            was_late: Set(false),
            created_at: Set(created_at),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

/// Finds an obligation by its id.
pub async fn get_obligation_by_id<C>(
    db: &C,
    obligation_id: i64,
) -> Result<Option<obligation::Model>>
where
    C: ConnectionTrait,
{
    Obligation::find_by_id(obligation_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// All obligations of one cycle, ordered by period and then rotation order.
pub async fn get_obligations_for_cycle<C>(
    db: &C,
    group_id: i64,
    cycle: i32,
) -> Result<Vec<obligation::Model>>
where
    C: ConnectionTrait,
{
    Obligation::find()
        .filter(obligation::Column::GroupId.eq(group_id))
        .filter(obligation::Column::Cycle.eq(cycle))
        .order_by_asc(obligation::Column::PeriodIndex)
        .order_by_asc(obligation::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// All obligations of one period of a cycle.
pub async fn get_obligations_for_period<C>(
    db: &C,
    group_id: i64,
    cycle: i32,
    period_index: i32,
) -> Result<Vec<obligation::Model>>
where
    C: ConnectionTrait,
{
    Obligation::find()
        .filter(obligation::Column::GroupId.eq(group_id))
        .filter(obligation::Column::Cycle.eq(cycle))
        .filter(obligation::Column::PeriodIndex.eq(period_index))
        .order_by_asc(obligation::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Due date of a period, read from its obligations.
pub async fn get_period_due_date<C>(
    db: &C,
    group_id: i64,
    cycle: i32,
    period_index: i32,
) -> Result<Option<NaiveDate>>
where
    C: ConnectionTrait,
{
    Ok(Obligation::find()
        .filter(obligation::Column::GroupId.eq(group_id))
        .filter(obligation::Column::Cycle.eq(cycle))
        .filter(obligation::Column::PeriodIndex.eq(period_index))
        .one(db)
        .await?
        .map(|o| o.due_date))
}

/// Payment events for a set of obligations, oldest first.
pub async fn get_payment_events_for_obligations<C>(
    db: &C,
    obligation_ids: &[i64],
) -> Result<Vec<payment_event::Model>>
where
    C: ConnectionTrait,
{
    if obligation_ids.is_empty() {
        return Ok(Vec::new());
    }
    PaymentEvent::find()
        .filter(payment_event::Column::ObligationId.is_in(obligation_ids.iter().copied()))
        .order_by_asc(payment_event::Column::PaidAt)
        .order_by_asc(payment_event::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Looks up the payment event recorded under an idempotency key for an obligation.
pub async fn find_payment_by_key<C>(
    db: &C,
    obligation_id: i64,
    idempotency_key: &str,
) -> Result<Option<payment_event::Model>>
where
    C: ConnectionTrait,
{
    PaymentEvent::find()
        .filter(payment_event::Column::ObligationId.eq(obligation_id))
        .filter(payment_event::Column::IdempotencyKey.eq(idempotency_key))
        .one(db)
        .await
        .map_err(Into::into)
}

/// A payment event about to be appended.
#[derive(Debug, Clone)]
pub struct NewPaymentEvent<'a> {
    /// Obligation being paid
    pub obligation_id: i64,
    /// Amount in minor units
    pub amount: i64,
    /// Payment time
    pub paid_at: DateTime<Utc>,
    /// Payment method tag
    pub method: &'a str,
    /// Client-supplied idempotency key
    pub idempotency_key: &'a str,
}

/// Appends a payment event. Fails with a unique-constraint violation if the
/// `(obligation_id, idempotency_key)` pair already exists.
pub async fn insert_payment_event<C>(
    db: &C,
    event: &NewPaymentEvent<'_>,
) -> Result<payment_event::Model>
where
    C: ConnectionTrait,
{
    payment_event::ActiveModel {
        obligation_id: Set(event.obligation_id),
        amount: Set(event.amount),
        paid_at: Set(event.paid_at),
        method: Set(event.method.to_string()),
        idempotency_key: Set(event.idempotency_key.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Sets the `was_late` audit flag. The flag is only ever set, never cleared.
pub async fn mark_obligation_late<C>(db: &C, obligation_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    Obligation::update_many()
        .col_expr(obligation::Column::WasLate, Expr::value(true))
        .filter(obligation::Column::Id.eq(obligation_id))
        .filter(obligation::Column::WasLate.eq(false))
        .exec(db)
        .await?;
    Ok(())
}

/// Loads one obligation with its payments as of `as_of`.
pub async fn load_obligation_snapshot<C>(
    db: &C,
    obligation_id: i64,
    as_of: DateTime<Utc>,
) -> Result<ObligationSnapshot>
where
    C: ConnectionTrait,
{
    let obligation = get_obligation_by_id(db, obligation_id)
        .await?
        .ok_or(Error::UnknownObligation { obligation_id })?;
    let payments = get_payment_events_for_obligations(db, &[obligation_id]).await?;
    Ok(ObligationSnapshot::new(obligation, payments, as_of))
}

/// Builds snapshots for a list of obligations, preserving their order.
pub async fn load_snapshots<C>(
    db: &C,
    obligations: Vec<obligation::Model>,
    as_of: DateTime<Utc>,
) -> Result<Vec<ObligationSnapshot>>
where
    C: ConnectionTrait,
{
    let ids: Vec<i64> = obligations.iter().map(|o| o.id).collect();
    let mut payments_by_obligation: HashMap<i64, Vec<payment_event::Model>> = HashMap::new();
    for event in get_payment_events_for_obligations(db, &ids).await? {
        payments_by_obligation
            .entry(event.obligation_id)
            .or_default()
            .push(event);
    }

    Ok(obligations
        .into_iter()
        .map(|o| {
            let payments = payments_by_obligation.remove(&o.id).unwrap_or_default();
            ObligationSnapshot::new(o, payments, as_of)
        })
        .collect())
}

/// Snapshots of every obligation in one cycle.
pub async fn load_cycle_snapshots<C>(
    db: &C,
    group_id: i64,
    cycle: i32,
    as_of: DateTime<Utc>,
) -> Result<Vec<ObligationSnapshot>>
where
    C: ConnectionTrait,
{
    let obligations = get_obligations_for_cycle(db, group_id, cycle).await?;
    load_snapshots(db, obligations, as_of).await
}

/// Snapshots of every obligation in one period.
pub async fn load_period_snapshots<C>(
    db: &C,
    group_id: i64,
    cycle: i32,
    period_index: i32,
    as_of: DateTime<Utc>,
) -> Result<Vec<ObligationSnapshot>>
where
    C: ConnectionTrait,
{
    let obligations = get_obligations_for_period(db, group_id, cycle, period_index).await?;
    load_snapshots(db, obligations, as_of).await
}

/// Sum of every payment applied to the group's obligations up to `as_of`, across all
/// cycles.
pub async fn total_applied_for_group<C>(
    db: &C,
    group_id: i64,
    as_of: DateTime<Utc>,
) -> Result<i64>
where
    C: ConnectionTrait,
{
    let events = PaymentEvent::find()
        .inner_join(Obligation)
        .filter(obligation::Column::GroupId.eq(group_id))
        .filter(payment_event::Column::PaidAt.lte(as_of))
        .all(db)
        .await?;
    Ok(events.iter().fold(0, |total, e| total.saturating_add(e.amount)))
}

/// Payouts recorded in one cycle, in period order.
pub async fn get_payouts_for_cycle<C>(
    db: &C,
    group_id: i64,
    cycle: i32,
) -> Result<Vec<payout::Model>>
where
    C: ConnectionTrait,
{
    Payout::find()
        .filter(payout::Column::GroupId.eq(group_id))
        .filter(payout::Column::Cycle.eq(cycle))
        .order_by_asc(payout::Column::PeriodIndex)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Number of payouts recorded in one cycle.
pub async fn count_payouts_for_cycle<C>(db: &C, group_id: i64, cycle: i32) -> Result<u64>
where
    C: ConnectionTrait,
{
    Payout::find()
        .filter(payout::Column::GroupId.eq(group_id))
        .filter(payout::Column::Cycle.eq(cycle))
        .count(db)
        .await
        .map_err(Into::into)
}
