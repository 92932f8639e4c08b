//! Core business logic - framework-agnostic ledger and rotation operations.
//!
//! Functions here take a database connection and return structured data. They know
//! nothing about locking or clocks; the [`crate::engine`] layer supplies both.

/// Group lifecycle: creation, lookup, cycles and closing
pub mod group;
/// Persistence helpers for obligations, payment events and payouts
pub mod ledger;
/// Obligation status derivation and snapshots
pub mod obligation;
/// Idempotent payment application
pub mod payment;
/// Derived aggregates and currency formatting
pub mod report;
/// Payout rotation
pub mod rotation;
/// Due-date scheduling
pub mod schedule;
