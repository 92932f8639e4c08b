//! Group business logic - Creating, looking up and retiring savings groups.
//!
//! Creating a group validates the whole configuration before anything is written, then
//! inserts the group, its members and the obligations of the first rotation cycle in one
//! database transaction. Groups are never deleted: closing one only flips its status so
//! the obligations, payments and payouts stay available for audit.

use crate::{
    config::settings::GroupConfig,
    core::{
        ledger,
        schedule::{self, Frequency, SchedulePlan},
    },
    entities::{Group, Member, group, member},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// Lifecycle status of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupStatus {
    /// Collecting contributions and paying out
    Active,
    /// Every member received the pot in the current cycle
    Completed,
    /// Retired by a coordinator; terminal
    Closed,
}

impl GroupStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Closed => "closed",
        }
    }

    /// Reads the status stored on a group row.
    pub fn of(group: &group::Model) -> Result<Self> {
        group.status.parse()
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "closed" => Ok(Self::Closed),
            other => Err(Error::invalid_config(
                "status",
                format!("unknown group status {other:?}"),
            )),
        }
    }
}

/// A member's role within a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRole {
    /// Runs the group; exactly one per group
    Coordinator,
    /// Regular participant
    Member,
}

impl MemberRole {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Member => "member",
        }
    }
}

impl FromStr for MemberRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coordinator" => Ok(Self::Coordinator),
            "member" => Ok(Self::Member),
            other => Err(Error::invalid_config(
                "members.role",
                format!("unknown role {other:?}, expected coordinator or member"),
            )),
        }
    }
}

/// A group with its members in rotation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDetails {
    /// The group row
    pub group: group::Model,
    /// Members ordered by rotation position
    pub members: Vec<member::Model>,
}

impl GroupDetails {
    /// Member ids in rotation order.
    #[must_use]
    pub fn member_ids(&self) -> Vec<i64> {
        self.members.iter().map(|m| m.id).collect()
    }

    /// Scheduling inputs for the given member ids and first period.
    pub fn schedule_plan<'a>(
        &self,
        member_ids: &'a [i64],
        first_period: u32,
    ) -> Result<SchedulePlan<'a>> {
        Ok(SchedulePlan {
            start_date: self.group.start_date,
            frequency: self.group.frequency.parse()?,
            contribution_amount: self.group.contribution_amount,
            member_ids,
            first_period,
        })
    }
}

struct ValidatedMember<'a> {
    user_id: &'a str,
    name: &'a str,
    role: MemberRole,
    join_date: NaiveDate,
}

struct ValidatedGroup<'a> {
    frequency: Frequency,
    start_date: NaiveDate,
    members: Vec<ValidatedMember<'a>>,
}

fn validate_group_config(config: &GroupConfig) -> Result<ValidatedGroup<'_>> {
    if config.name.trim().is_empty() {
        return Err(Error::invalid_config("name", "group name cannot be empty"));
    }
    if config.member_count < 2 {
        return Err(Error::invalid_config(
            "member_count",
            format!(
                "a savings group needs at least 2 members, got {}",
                config.member_count
            ),
        ));
    }
    if usize::try_from(config.member_count)? != config.members.len() {
        return Err(Error::invalid_config(
            "members",
            format!(
                "member_count is {} but {} members were listed",
                config.member_count,
                config.members.len()
            ),
        ));
    }
    if config.contribution_amount <= 0 {
        return Err(Error::invalid_config(
            "contribution_amount",
            format!(
                "contribution must be positive, got {}",
                config.contribution_amount
            ),
        ));
    }
    let frequency: Frequency = config.frequency.parse()?;
    let start_date = schedule::parse_calendar_date("start_date", &config.start_date)?;

    let mut seen_users = HashSet::new();
    let mut members = Vec::with_capacity(config.members.len());
    for member in &config.members {
        if member.user_id.trim().is_empty() {
            return Err(Error::invalid_config(
                "members.user_id",
                "member user id cannot be empty",
            ));
        }
        if member.name.trim().is_empty() {
            return Err(Error::invalid_config(
                "members.name",
                format!("member {} has no name", member.user_id),
            ));
        }
        if !seen_users.insert(member.user_id.trim()) {
            return Err(Error::invalid_config(
                "members.user_id",
                format!("user {} is listed more than once", member.user_id),
            ));
        }
        let join_date = schedule::parse_calendar_date("members.join_date", &member.join_date)?;
        if join_date > start_date {
            return Err(Error::invalid_config(
                "members.join_date",
                format!(
                    "{} joins on {join_date}, after the first due date {start_date}",
                    member.name
                ),
            ));
        }
        members.push(ValidatedMember {
            user_id: member.user_id.trim(),
            name: member.name.trim(),
            role: member.role.parse()?,
            join_date,
        });
    }

    let coordinators = members
        .iter()
        .filter(|m| m.role == MemberRole::Coordinator)
        .count();
    if coordinators != 1 {
        return Err(Error::invalid_config(
            "members.role",
            format!("a group needs exactly one coordinator, found {coordinators}"),
        ));
    }

    Ok(ValidatedGroup {
        frequency,
        start_date,
        members,
    })
}

/// Creates a group, its members and the obligations of its first rotation cycle.
///
/// Members are stored in the order given, which becomes the payout rotation.
///
/// # Errors
/// Returns [`Error::InvalidConfiguration`] naming the offending field when the
/// configuration is rejected; nothing is written in that case.
#[instrument(skip(db, config), fields(group = %config.name))]
pub async fn create_group(
    db: &DatabaseConnection,
    config: &GroupConfig,
    now: DateTime<Utc>,
) -> Result<GroupDetails> {
    let validated = validate_group_config(config)?;

    let txn = db.begin().await?;

    let group = group::ActiveModel {
        name: Set(config.name.trim().to_string()),
        description: Set(config.description.clone()),
        member_count: Set(config.member_count),
        contribution_amount: Set(config.contribution_amount),
        frequency: Set(validated.frequency.as_str().to_string()),
        start_date: Set(validated.start_date),
        rotation_position: Set(0),
        current_cycle: Set(0),
        status: Set(GroupStatus::Active.as_str().to_string()),
        created_at: Set(now),
        closed_at: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let mut members = Vec::with_capacity(validated.members.len());
    for (position, member) in validated.members.iter().enumerate() {
        let model = member::ActiveModel {
            group_id: Set(group.id),
            user_id: Set(member.user_id.to_string()),
            display_name: Set(member.name.to_string()),
            role: Set(member.role.as_str().to_string()),
            join_date: Set(member.join_date),
            position: Set(i32::try_from(position)?),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        members.push(model);
    }

    let details = GroupDetails { group, members };
    let member_ids = details.member_ids();
    let horizon = u32::try_from(member_ids.len())?;
    let scheduled =
        schedule::generate_obligations(&details.schedule_plan(&member_ids, 0)?, horizon)?;
    ledger::insert_obligations(&txn, details.group.id, 0, &scheduled, now).await?;

    txn.commit().await?;

    info!(
        "Created group {} ({}) with {} members and {} obligations",
        details.group.id,
        details.group.name,
        details.members.len(),
        scheduled.len()
    );
    Ok(details)
}

/// Finds a group by its id.
pub async fn get_group_by_id<C>(db: &C, group_id: i64) -> Result<Option<group::Model>>
where
    C: ConnectionTrait,
{
    Group::find_by_id(group_id).one(db).await.map_err(Into::into)
}

/// Finds a group by its id, failing with [`Error::UnknownGroup`] if absent.
pub async fn require_group<C>(db: &C, group_id: i64) -> Result<group::Model>
where
    C: ConnectionTrait,
{
    get_group_by_id(db, group_id)
        .await?
        .ok_or(Error::UnknownGroup { group_id })
}

/// Finds a group by its exact name.
pub async fn get_group_by_name(
    db: &DatabaseConnection,
    name: &str,
) -> Result<Option<group::Model>> {
    Group::find()
        .filter(group::Column::Name.eq(name))
        .order_by_asc(group::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Members of a group in rotation order.
pub async fn get_members<C>(db: &C, group_id: i64) -> Result<Vec<member::Model>>
where
    C: ConnectionTrait,
{
    Member::find()
        .filter(member::Column::GroupId.eq(group_id))
        .order_by_asc(member::Column::Position)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Loads a group with its members.
pub async fn get_group_details<C>(db: &C, group_id: i64) -> Result<GroupDetails>
where
    C: ConnectionTrait,
{
    let group = require_group(db, group_id).await?;
    let members = get_members(db, group_id).await?;
    Ok(GroupDetails { group, members })
}

/// Every group, oldest first.
pub async fn list_all_groups(db: &DatabaseConnection) -> Result<Vec<group::Model>> {
    Group::find()
        .order_by_asc(group::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Groups in which `user_id` is a member, oldest first.
pub async fn list_groups_for_user(
    db: &DatabaseConnection,
    user_id: &str,
) -> Result<Vec<GroupDetails>> {
    let group_ids: Vec<i64> = Member::find()
        .filter(member::Column::UserId.eq(user_id))
        .all(db)
        .await?
        .into_iter()
        .map(|m| m.group_id)
        .collect();

    if group_ids.is_empty() {
        return Ok(Vec::new());
    }

    let groups = Group::find()
        .filter(group::Column::Id.is_in(group_ids))
        .order_by_asc(group::Column::Id)
        .all(db)
        .await?;

    let mut details = Vec::with_capacity(groups.len());
    for group in groups {
        let members = get_members(db, group.id).await?;
        details.push(GroupDetails { group, members });
    }
    Ok(details)
}

/// Retires a group. Closing is soft and terminal; closing twice is a no-op.
#[instrument(skip(db))]
pub async fn close_group(
    db: &DatabaseConnection,
    group_id: i64,
    now: DateTime<Utc>,
) -> Result<group::Model> {
    let group = require_group(db, group_id).await?;
    if GroupStatus::of(&group)? == GroupStatus::Closed {
        debug!("Group {} is already closed", group_id);
        return Ok(group);
    }

    let mut active: group::ActiveModel = group.into();
    active.status = Set(GroupStatus::Closed.as_str().to_string());
    active.closed_at = Set(Some(now));
    let closed = active.update(db).await?;

    info!("Closed group {}", group_id);
    Ok(closed)
}

/// Starts the next rotation cycle of a completed group by generating a new horizon of
/// obligations, continuing the original schedule where the last cycle ended.
///
/// # Errors
/// - [`Error::GroupNotActive`] if the group is closed
/// - [`Error::RotationInProgress`] if members are still waiting for their payout
#[instrument(skip(db))]
pub async fn start_next_cycle(
    db: &DatabaseConnection,
    group_id: i64,
    now: DateTime<Utc>,
) -> Result<GroupDetails> {
    let txn = db.begin().await?;

    let details = get_group_details(&txn, group_id).await?;
    let group = &details.group;
    match GroupStatus::of(group)? {
        GroupStatus::Completed => {}
        GroupStatus::Closed => {
            return Err(Error::GroupNotActive {
                group_id,
                status: group.status.clone(),
            });
        }
        GroupStatus::Active => {
            return Err(Error::RotationInProgress {
                group_id,
                remaining: group.member_count - group.rotation_position,
            });
        }
    }

    let next_cycle = group.current_cycle + 1;
    let member_ids = details.member_ids();
    let member_count = u32::try_from(member_ids.len())?;
    let first_period = u32::try_from(next_cycle)?
        .checked_mul(member_count)
        .ok_or_else(|| Error::invalid_config("current_cycle", "cycle index overflow"))?;
    let scheduled = schedule::generate_obligations(
        &details.schedule_plan(&member_ids, first_period)?,
        member_count,
    )?;
    ledger::insert_obligations(&txn, group_id, next_cycle, &scheduled, now).await?;

    let mut active: group::ActiveModel = details.group.clone().into();
    active.current_cycle = Set(next_cycle);
    active.rotation_position = Set(0);
    active.status = Set(GroupStatus::Active.as_str().to_string());
    let group = active.update(&txn).await?;

    txn.commit().await?;

    info!("Group {} started rotation cycle {}", group_id, next_cycle);
    Ok(GroupDetails {
        group,
        members: details.members,
    })
}
