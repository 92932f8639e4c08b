//! Engine layer - the narrow async API callers use.
//!
//! [`Engine`] owns the database connection, the ledger settings, a per-group lock table
//! and a clock. Every operation reads the clock once and passes that instant down to the
//! core functions, so a single call sees one consistent "now".

/// Contribution listing and payment submission
pub mod contributions;
/// Group lifecycle, views and seeding
pub mod groups;
/// Per-group serialization
pub mod locks;
/// Next payout and payout recording
pub mod payouts;

use crate::{
    config::{database, settings::LedgerSettings},
    errors::Result,
};
use chrono::{DateTime, Utc};
use locks::GroupLocks;
use sea_orm::DatabaseConnection;
use tracing::info;

/// Source of the current time.
pub type Clock = fn() -> DateTime<Utc>;

/// Shared state behind every ledger operation.
#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    settings: LedgerSettings,
    locks: GroupLocks,
    clock: Clock,
}

impl Engine {
    /// Wraps an existing connection whose schema is already in place.
    #[must_use]
    pub fn new(database: DatabaseConnection, settings: LedgerSettings) -> Self {
        Self {
            database,
            settings,
            locks: GroupLocks::new(),
            clock: Utc::now,
        }
    }

    /// Connects to `database_url` and creates any missing tables.
    ///
    /// # Errors
    /// Returns [`crate::errors::Error::Config`] if `settings` fail validation, or a
    /// database error if the connection or schema setup fails.
    pub async fn open(database_url: &str, settings: LedgerSettings) -> Result<Self> {
        settings.validate()?;
        let database = database::create_connection(database_url).await?;
        database::create_tables(&database).await?;
        info!("Ledger engine ready");
        Ok(Self::new(database, settings))
    }

    /// Replaces the clock, e.g. with a fixed instant in tests.
    #[must_use]
    pub const fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The underlying database connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.database
    }

    /// Active ledger settings.
    #[must_use]
    pub const fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Closes the database connection.
    pub async fn close(self) -> Result<()> {
        self.database.close().await?;
        info!("Ledger engine closed");
        Ok(())
    }
}
