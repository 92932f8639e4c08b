//! Member entity - A participant of a savings group.
//!
//! `position` is the member's place in the payout rotation and follows join order.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Member database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "members")]
pub struct Model {
    /// Unique identifier for the member
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Group this membership belongs to
    pub group_id: i64,
    /// External user reference supplied by the caller
    pub user_id: String,
    /// Name shown to other members
    pub display_name: String,
    /// `"coordinator"` or `"member"`
    pub role: String,
    /// Date the member joined the group
    pub join_date: Date,
    /// Rotation order, 0-based
    pub position: i32,
}

/// Defines relationships between Member and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each member belongs to one group
    #[sea_orm(
        belongs_to = "super::group::Entity",
        from = "Column::GroupId",
        to = "super::group::Column::Id"
    )]
    Group,
}

impl Related<super::group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Group.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
