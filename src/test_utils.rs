//! Shared test utilities for the ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating groups and payments with sensible defaults.

use crate::{
    config::settings::{GroupConfig, MemberConfig},
    core::{
        group::{self, GroupDetails},
        ledger,
        payment::PaymentRequest,
    },
    entities,
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sea_orm::DatabaseConnection;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Calendar date shorthand. Panics on an invalid date.
#[allow(clippy::unwrap_used)]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Noon UTC on the given date.
#[allow(clippy::unwrap_used)]
pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

/// A three-member monthly group config.
///
/// # Defaults
/// * members: Ada (coordinator), Bola, Chidi, all joined 2023-12-01
/// * `contribution_amount`: 10,000 minor units
/// * `start_date`: 2024-01-01
pub fn three_member_config(name: &str) -> GroupConfig {
    let member = |user_id: &str, name: &str, role: &str| MemberConfig {
        user_id: user_id.to_string(),
        name: name.to_string(),
        role: role.to_string(),
        join_date: "2023-12-01".to_string(),
    };

    GroupConfig {
        name: name.to_string(),
        description: format!("{name} test group"),
        member_count: 3,
        contribution_amount: 10_000,
        frequency: "monthly".to_string(),
        start_date: "2024-01-01".to_string(),
        members: vec![
            member("ada", "Ada", "coordinator"),
            member("bola", "Bola", "member"),
            member("chidi", "Chidi", "member"),
        ],
    }
}

/// Sets up a complete test environment with the three-member group.
/// Returns (db, group details) for common test scenarios.
pub async fn setup_with_group() -> Result<(DatabaseConnection, GroupDetails)> {
    let db = setup_test_db().await?;
    let details = group::create_group(&db, &three_member_config("Test Circle"), at(2023, 12, 1))
        .await?;
    Ok((db, details))
}

/// The first obligation of a group: period 0 of cycle 0, owed by the first member.
pub async fn first_obligation(
    db: &DatabaseConnection,
    group_id: i64,
) -> Result<entities::obligation::Model> {
    ledger::get_obligations_for_period(db, group_id, 0, 0)
        .await?
        .into_iter()
        .next()
        .ok_or(Error::UnknownGroup { group_id })
}

/// A card payment request.
pub fn payment_request(
    obligation_id: i64,
    amount: i64,
    idempotency_key: &str,
    paid_at: DateTime<Utc>,
) -> PaymentRequest {
    PaymentRequest {
        obligation_id,
        amount,
        method: "card".to_string(),
        idempotency_key: idempotency_key.to_string(),
        paid_at,
    }
}
