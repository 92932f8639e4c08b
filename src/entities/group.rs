//! Group entity - A savings circle (ROSCA).
//!
//! Each group has a fixed contribution amount, a contribution frequency and a start
//! date. Members receive the pooled pot in rotation order, one per period.
//! `rotation_position` counts payouts recorded in the current cycle.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Group database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "groups")]
pub struct Model {
    /// Unique identifier for the group
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name (e.g., "Family Savings Circle")
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Number of members; always equals the number of member rows
    pub member_count: i32,
    /// Contribution per member per period, in minor units (pence)
    pub contribution_amount: i64,
    /// Contribution frequency: `"weekly"`, `"biweekly"` or `"monthly"`
    pub frequency: String,
    /// Due date of the very first period
    pub start_date: Date,
    /// Number of payouts recorded in the current cycle (index into member order)
    pub rotation_position: i32,
    /// Current rotation cycle, starting at 0
    pub current_cycle: i32,
    /// Lifecycle status: `"active"`, `"completed"` or `"closed"`
    pub status: String,
    /// When the group was created
    pub created_at: DateTimeUtc,
    /// When the group was closed, if it was
    pub closed_at: Option<DateTimeUtc>,
}

/// Defines relationships between Group and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One group has many members
    #[sea_orm(has_many = "super::member::Entity")]
    Members,
    /// One group has many obligations
    #[sea_orm(has_many = "super::obligation::Entity")]
    Obligations,
    /// One group has many payouts
    #[sea_orm(has_many = "super::payout::Entity")]
    Payouts,
}

impl Related<super::member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl Related<super::obligation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Obligations.def()
    }
}

impl Related<super::payout::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payouts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
