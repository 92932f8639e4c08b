//! Rotation engine - Decides who receives the pot next and records payouts.
//!
//! Recipients follow the fixed member order. The member at rotation position `p` is paid
//! out from period `p` of the current cycle, and only once every obligation of that
//! period is paid. Payouts are never recorded ahead of collections and never skip a
//! period: the group's `rotation_position` moves by exactly one per recorded payout,
//! guarded by a compare-and-set on the stored position.

use crate::{
    core::{
        group::{self, GroupDetails, GroupStatus},
        ledger,
    },
    entities::{Group, Payout, group as group_entity, payout},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use tracing::{error, info, instrument};

/// The next payout of a group as of a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextPayout {
    /// The group
    pub group_id: i64,
    /// Current rotation cycle
    pub cycle: i32,
    /// Period within the cycle that funds the payout
    pub period_index: i32,
    /// Member who receives the pot
    pub recipient_member_id: i64,
    /// Recipient's display name
    pub recipient_name: String,
    /// Scheduled payout date (the period's due date)
    pub payout_date: NaiveDate,
    /// Pot size in minor units
    pub pot_amount: i64,
    /// Whether every obligation of the period is paid
    pub collected: bool,
    /// Every member has been paid out in this cycle; the fields above then describe the
    /// final payout of the cycle
    pub cycle_complete: bool,
}

/// Verifies that the stored rotation position matches the payouts recorded for the
/// current cycle and the member list.
async fn check_rotation<C>(db: &C, details: &GroupDetails) -> Result<()>
where
    C: ConnectionTrait,
{
    let group = &details.group;
    let recorded = ledger::count_payouts_for_cycle(db, group.id, group.current_cycle).await?;

    let message = if i64::from(group.member_count) != i64::try_from(details.members.len())? {
        Some(format!(
            "member_count is {} but the group has {} members",
            group.member_count,
            details.members.len()
        ))
    } else if group.rotation_position < 0 || group.rotation_position > group.member_count {
        Some(format!(
            "rotation position {} is outside 0..={}",
            group.rotation_position, group.member_count
        ))
    } else if u64::try_from(group.rotation_position)? != recorded {
        Some(format!(
            "rotation position {} but {} payouts recorded in cycle {}",
            group.rotation_position, recorded, group.current_cycle
        ))
    } else {
        None
    };

    match message {
        Some(message) => {
            error!("Rotation invariant violated for group {}: {}", group.id, message);
            Err(Error::OutOfOrderRotation {
                group_id: group.id,
                message,
            })
        }
        None => Ok(()),
    }
}

struct PeriodCollection {
    due_date: NaiveDate,
    pot_amount: i64,
    collected: bool,
}

async fn period_collection<C>(
    db: &C,
    group: &group_entity::Model,
    period_index: i32,
    as_of: DateTime<Utc>,
) -> Result<PeriodCollection>
where
    C: ConnectionTrait,
{
    let snapshots =
        ledger::load_period_snapshots(db, group.id, group.current_cycle, period_index, as_of)
            .await?;
    let Some(first) = snapshots.first() else {
        let message = format!(
            "no obligations for period {period_index} of cycle {}",
            group.current_cycle
        );
        error!("Rotation invariant violated for group {}: {}", group.id, message);
        return Err(Error::OutOfOrderRotation {
            group_id: group.id,
            message,
        });
    };

    Ok(PeriodCollection {
        due_date: first.obligation.due_date,
        pot_amount: snapshots
            .iter()
            .fold(0, |pot, s| pot.saturating_add(s.obligation.amount_owed)),
        collected: snapshots.iter().all(|s| s.is_paid()),
    })
}

/// Whether every obligation of a period is paid as of `as_of`.
pub async fn is_period_collected<C>(
    db: &C,
    group_id: i64,
    period_index: i32,
    as_of: DateTime<Utc>,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let group = group::require_group(db, group_id).await?;
    Ok(period_collection(db, &group, period_index, as_of)
        .await?
        .collected)
}

async fn next_payout_for<C>(
    db: &C,
    details: &GroupDetails,
    as_of: DateTime<Utc>,
) -> Result<NextPayout>
where
    C: ConnectionTrait,
{
    check_rotation(db, details).await?;

    let group = &details.group;
    let cycle_complete = group.rotation_position >= group.member_count;
    let period_index = if cycle_complete {
        group.member_count - 1
    } else {
        group.rotation_position
    };
    let recipient = &details.members[usize::try_from(period_index)?];
    let collection = period_collection(db, group, period_index, as_of).await?;

    Ok(NextPayout {
        group_id: group.id,
        cycle: group.current_cycle,
        period_index,
        recipient_member_id: recipient.id,
        recipient_name: recipient.display_name.clone(),
        payout_date: collection.due_date,
        pot_amount: collection.pot_amount,
        collected: cycle_complete || collection.collected,
        cycle_complete,
    })
}

/// Computes the next payout target of a group.
///
/// While the current period is not fully collected the same recipient keeps being
/// returned with `collected = false`.
///
/// # Errors
/// - [`Error::UnknownGroup`] if the group does not exist
/// - [`Error::OutOfOrderRotation`] if the stored rotation state is inconsistent
pub async fn next_payout<C>(db: &C, group_id: i64, as_of: DateTime<Utc>) -> Result<NextPayout>
where
    C: ConnectionTrait,
{
    let details = group::get_group_details(db, group_id).await?;
    next_payout_for(db, &details, as_of).await
}

/// Marks the current recipient as paid out and advances the rotation by one.
///
/// # Errors
/// - [`Error::GroupNotActive`] if the group is closed
/// - [`Error::CycleComplete`] if every member was already paid out this cycle
/// - [`Error::CollectionIncomplete`] if the current period still has unpaid obligations
/// - [`Error::OutOfOrderRotation`] if the rotation state is inconsistent or moved
///   underneath this call
#[instrument(skip(db))]
pub async fn record_payout(
    db: &DatabaseConnection,
    group_id: i64,
    as_of: DateTime<Utc>,
) -> Result<payout::Model> {
    let txn = db.begin().await?;

    let details = group::get_group_details(&txn, group_id).await?;
    if GroupStatus::of(&details.group)? == GroupStatus::Closed {
        return Err(Error::GroupNotActive {
            group_id,
            status: details.group.status.clone(),
        });
    }

    let next = next_payout_for(&txn, &details, as_of).await?;
    if next.cycle_complete {
        return Err(Error::CycleComplete {
            group_id,
            cycle: next.cycle,
        });
    }
    if !next.collected {
        return Err(Error::CollectionIncomplete {
            group_id,
            period_index: next.period_index,
        });
    }

    let payout = payout::ActiveModel {
        group_id: Set(group_id),
        member_id: Set(next.recipient_member_id),
        cycle: Set(next.cycle),
        period_index: Set(next.period_index),
        amount: Set(next.pot_amount),
        payout_date: Set(next.payout_date),
        recorded_at: Set(as_of),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let new_position = next.period_index + 1;
    let status = if new_position >= details.group.member_count {
        GroupStatus::Completed
    } else {
        GroupStatus::Active
    };
    let updated = Group::update_many()
        .col_expr(group_entity::Column::RotationPosition, Expr::value(new_position))
        .col_expr(group_entity::Column::Status, Expr::value(status.as_str()))
        .filter(group_entity::Column::Id.eq(group_id))
        .filter(group_entity::Column::CurrentCycle.eq(next.cycle))
        .filter(group_entity::Column::RotationPosition.eq(next.period_index))
        .exec(&txn)
        .await?;
    if updated.rows_affected != 1 {
        let message = format!(
            "rotation position moved away from {} while recording a payout",
            next.period_index
        );
        error!("Rotation invariant violated for group {}: {}", group_id, message);
        return Err(Error::OutOfOrderRotation { group_id, message });
    }

    txn.commit().await?;

    info!(
        "Recorded payout of {} to {} for period {} of cycle {}",
        payout.amount, next.recipient_name, next.period_index, next.cycle
    );
    Ok(payout)
}

/// Records a payout for every consecutive collected period, in due-date order, stopping
/// at the first period that is not fully collected.
pub async fn advance_rotation(
    db: &DatabaseConnection,
    group_id: i64,
    as_of: DateTime<Utc>,
) -> Result<Vec<payout::Model>> {
    let mut payouts = Vec::new();
    loop {
        let next = next_payout(db, group_id, as_of).await?;
        if next.cycle_complete || !next.collected {
            break;
        }
        payouts.push(record_payout(db, group_id, as_of).await?);
    }
    Ok(payouts)
}

/// Every payout a group has made, oldest first.
pub async fn list_payouts(db: &DatabaseConnection, group_id: i64) -> Result<Vec<payout::Model>> {
    Payout::find()
        .filter(payout::Column::GroupId.eq(group_id))
        .order_by_asc(payout::Column::Cycle)
        .order_by_asc(payout::Column::PeriodIndex)
        .all(db)
        .await
        .map_err(Into::into)
}
