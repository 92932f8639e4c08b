//! Payment event entity - An immutable record of money applied to an obligation.
//!
//! `(obligation_id, idempotency_key)` is unique at the database level, which is what
//! makes payment application at-most-once under concurrent submissions.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment event database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_events")]
pub struct Model {
    /// Unique identifier for the payment event
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Obligation the payment was applied to
    pub obligation_id: i64,
    /// Amount paid in minor units
    pub amount: i64,
    /// When the payment was made
    pub paid_at: DateTimeUtc,
    /// Payment method tag (e.g., `"card"`, `"bank"`)
    pub method: String,
    /// Client-supplied key; a repeated key never applies twice
    pub idempotency_key: String,
}

/// Defines relationships between `PaymentEvent` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payment event belongs to one obligation
    #[sea_orm(
        belongs_to = "super::obligation::Entity",
        from = "Column::ObligationId",
        to = "super::obligation::Column::Id"
    )]
    Obligation,
}

impl Related<super::obligation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Obligation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
