//! Obligation entity - One scheduled contribution owed by one member for one period.
//!
//! The payment status is not stored. It is derived from the obligation's payment events
//! and the clock, see `core::obligation`. Only the `was_late` audit flag is persisted.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Obligation database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "obligations")]
pub struct Model {
    /// Unique identifier for the obligation
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Group the obligation belongs to
    pub group_id: i64,
    /// Member who owes the contribution
    pub member_id: i64,
    /// Rotation cycle this obligation was generated for
    pub cycle: i32,
    /// Period within the cycle, 0-based
    pub period_index: i32,
    /// Calendar date the contribution is due
    pub due_date: Date,
    /// Amount owed in minor units, copied from the group at creation
    pub amount_owed: i64,
    /// Set once a payment arrived after the due date with the obligation unsatisfied
    pub was_late: bool,
    /// When the obligation was generated
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Obligation and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each obligation belongs to one group
    #[sea_orm(
        belongs_to = "super::group::Entity",
        from = "Column::GroupId",
        to = "super::group::Column::Id"
    )]
    Group,
    /// Each obligation is owed by one member
    #[sea_orm(
        belongs_to = "super::member::Entity",
        from = "Column::MemberId",
        to = "super::member::Column::Id"
    )]
    Member,
    /// One obligation has many payment events
    #[sea_orm(has_many = "super::payment_event::Entity")]
    PaymentEvents,
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

impl Related<super::payment_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentEvents.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
