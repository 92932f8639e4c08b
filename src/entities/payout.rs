//! Payout entity - Records that a period's pot was paid out to its recipient.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payout database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payouts")]
pub struct Model {
    /// Unique identifier for the payout
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Group that paid out
    pub group_id: i64,
    /// Member who received the pot
    pub member_id: i64,
    /// Rotation cycle of the payout
    pub cycle: i32,
    /// Period within the cycle that funded the payout
    pub period_index: i32,
    /// Pot size in minor units
    pub amount: i64,
    /// Scheduled payout date (the period's due date)
    pub payout_date: Date,
    /// When the payout was recorded
    pub recorded_at: DateTimeUtc,
}

/// Defines relationships between Payout and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payout belongs to one group
    #[sea_orm(
        belongs_to = "super::group::Entity",
        from = "Column::GroupId",
        to = "super::group::Column::Id"
    )]
    Group,
    /// Each payout goes to one member
    #[sea_orm(
        belongs_to = "super::member::Entity",
        from = "Column::MemberId",
        to = "super::member::Column::Id"
    )]
    Member,
}

impl Related<super::group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Group.def()
    }
}

impl Related<super::member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Member.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
