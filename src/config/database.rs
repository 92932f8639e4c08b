//! Database configuration module for the ledger store.
//!
//! This module handles `SQLite` connections and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. Composite uniqueness that the entity
//! derive cannot express (idempotency keys, one payout per period, one obligation per
//! member and period) is added as explicit unique indexes.

use crate::entities::{
    Group, Member, MemberColumn, Obligation, ObligationColumn, PaymentEvent, PaymentEventColumn,
    Payout, PayoutColumn,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/rosca_ledger.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable, falling back to
/// a local `SQLite` file.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database at `database_url`.
///
/// For file-backed `SQLite` URLs the parent directory is created first, since `SQLite`
/// will create the file but not its directory.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    if let Some(parent) = sqlite_parent_dir(database_url) {
        debug!("Ensuring database directory {:?} exists", parent);
        std::fs::create_dir_all(parent)?;
    }

    Database::connect(database_url).await.map_err(Into::into)
}

fn sqlite_parent_dir(database_url: &str) -> Option<&Path> {
    let path = database_url.strip_prefix("sqlite://")?;
    let path = path.split('?').next()?;
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    Path::new(path)
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
}

/// Creates all ledger tables and unique indexes if they do not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut tables = [
        schema.create_table_from_entity(Group),
        schema.create_table_from_entity(Member),
        schema.create_table_from_entity(Obligation),
        schema.create_table_from_entity(PaymentEvent),
        schema.create_table_from_entity(Payout),
    ];
    for table in &mut tables {
        table.if_not_exists();
        db.execute(builder.build(&*table)).await?;
    }

    for index in unique_indexes() {
        db.execute(builder.build(&index)).await?;
    }

    info!("Ledger tables and indexes ensured");
    Ok(())
}

fn unique_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("idx_members_group_user")
            .table(Member)
            .col(MemberColumn::GroupId)
            .col(MemberColumn::UserId)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_obligations_slot")
            .table(Obligation)
            .col(ObligationColumn::GroupId)
            .col(ObligationColumn::Cycle)
            .col(ObligationColumn::PeriodIndex)
            .col(ObligationColumn::MemberId)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_payment_events_idempotency")
            .table(PaymentEvent)
            .col(PaymentEventColumn::ObligationId)
            .col(PaymentEventColumn::IdempotencyKey)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("idx_payouts_period")
            .table(Payout)
            .col(PayoutColumn::GroupId)
            .col(PayoutColumn::Cycle)
            .col(PayoutColumn::PeriodIndex)
            .unique()
            .if_not_exists()
            .to_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        group::Model as GroupModel, member::Model as MemberModel,
        obligation::Model as ObligationModel, payment_event::Model as PaymentEventModel,
        payout::Model as PayoutModel,
    };
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<GroupModel> = Group::find().limit(1).all(&db).await?;
        let _: Vec<MemberModel> = Member::find().limit(1).all(&db).await?;
        let _: Vec<ObligationModel> = Obligation::find().limit(1).all(&db).await?;
        let _: Vec<PaymentEventModel> = PaymentEvent::find().limit(1).all(&db).await?;
        let _: Vec<PayoutModel> = Payout::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[test]
    fn test_sqlite_parent_dir() {
        assert_eq!(
            sqlite_parent_dir("sqlite://data/ledger.sqlite?mode=rwc"),
            Some(Path::new("data"))
        );
        assert_eq!(sqlite_parent_dir("sqlite://ledger.sqlite"), None);
        assert_eq!(sqlite_parent_dir("sqlite::memory:"), None);
        assert_eq!(sqlite_parent_dir("postgres://localhost/ledger"), None);
    }
}
