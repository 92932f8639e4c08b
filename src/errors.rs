//! Unified error type for the ledger engine.
//!
//! Validation failures carry enough detail (the offending field, the amounts involved)
//! for a caller to render a field-level message. Duplicate payments are not errors; see
//! [`crate::core::payment::PaymentOutcome`].

use thiserror::Error;

/// All failures the engine can surface to a caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Application configuration (config file, environment) could not be loaded.
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// A group setup was rejected before any obligation was created.
    #[error("Invalid group configuration ({field}): {message}")]
    InvalidConfiguration {
        /// Name of the offending field
        field: &'static str,
        /// Human-readable reason
        message: String,
    },

    /// No group exists with this id.
    #[error("Group not found: {group_id}")]
    UnknownGroup {
        /// The id that failed to resolve
        group_id: i64,
    },

    /// No obligation exists with this id.
    #[error("Obligation not found: {obligation_id}")]
    UnknownObligation {
        /// The id that failed to resolve
        obligation_id: i64,
    },

    /// Payment amounts must be positive minor units.
    #[error("Invalid amount: {amount} (must be a positive number of minor units)")]
    InvalidAmount {
        /// The rejected amount in minor units
        amount: i64,
    },

    /// A payment request field other than the amount was rejected.
    #[error("Invalid payment ({field}): {message}")]
    InvalidPayment {
        /// Name of the offending field
        field: &'static str,
        /// Human-readable reason
        message: String,
    },

    /// The payment would take the obligation beyond what is owed plus tolerance.
    #[error(
        "Overpayment rejected: owed {owed}, paid {already_paid}, tried {attempted} (+{tolerance})"
    )]
    OverpaymentRejected {
        /// Amount owed on the obligation
        owed: i64,
        /// Sum of payments already applied
        already_paid: i64,
        /// Amount of the rejected payment
        attempted: i64,
        /// Configured overpayment tolerance
        tolerance: i64,
    },

    /// The group is completed or closed and cannot take this action.
    #[error("Group {group_id} is {status}")]
    GroupNotActive {
        /// The group id
        group_id: i64,
        /// Current lifecycle status
        status: String,
    },

    /// The current period still has unpaid obligations.
    #[error("Period {period_index} of group {group_id} is not fully collected")]
    CollectionIncomplete {
        /// The group id
        group_id: i64,
        /// Period within the current cycle
        period_index: i32,
    },

    /// Every member has already received a payout in the current cycle.
    #[error("Rotation cycle {cycle} of group {group_id} is already complete")]
    CycleComplete {
        /// The group id
        group_id: i64,
        /// The completed cycle
        cycle: i32,
    },

    /// A new cycle was requested while members are still waiting for their payout.
    #[error("Group {group_id} still has {remaining} payouts to make in this cycle")]
    RotationInProgress {
        /// The group id
        group_id: i64,
        /// Payouts left in the current cycle
        remaining: i32,
    },

    /// Rotation position disagrees with recorded payouts. Never corrected silently.
    #[error("Rotation out of order for group {group_id}: {message}")]
    OutOfOrderRotation {
        /// The group id
        group_id: i64,
        /// Description of the inconsistency
        message: String,
    },

    /// A currency string could not be parsed into minor units.
    #[error("Invalid currency value: {value:?}")]
    InvalidCurrency {
        /// The rejected input
        value: String,
    },

    /// Error from the underlying store.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error.
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Integer conversion overflowed.
    #[error("Integer conversion error: {0}")]
    TryFromInt(#[from] std::num::TryFromIntError),
}

impl Error {
    /// Shorthand for an [`Error::InvalidConfiguration`] on `field`.
    pub fn invalid_config(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            message: message.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
