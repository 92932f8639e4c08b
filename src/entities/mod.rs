//! Entity module - Contains all SeaORM entity definitions for the ledger store.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod group;
pub mod member;
pub mod obligation;
pub mod payment_event;
pub mod payout;

// Re-export specific types to avoid conflicts
pub use group::{Column as GroupColumn, Entity as Group, Model as GroupModel};
pub use member::{Column as MemberColumn, Entity as Member, Model as MemberModel};
pub use obligation::{Column as ObligationColumn, Entity as Obligation, Model as ObligationModel};
pub use payment_event::{
    Column as PaymentEventColumn, Entity as PaymentEvent, Model as PaymentEventModel,
};
pub use payout::{Column as PayoutColumn, Entity as Payout, Model as PayoutModel};
