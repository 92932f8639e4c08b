//! Ledger configuration loading from config.toml
//!
//! The `[ledger]` table holds payment policy settings. Each `[[groups]]` entry describes a
//! savings group in the same shape a caller passes to `create_group`; groups listed here
//! are seeded into the store on startup when no group with that name exists yet.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Payment policy settings
    #[serde(default)]
    pub ledger: LedgerSettings,
    /// Groups to seed on startup
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

/// Payment policy applied by the payment processor.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerSettings {
    /// Record payments beyond the amount owed instead of rejecting them
    pub allow_overpayment: bool,
    /// Minor units a payment may exceed the amount owed by when overpayment is disallowed
    pub overpayment_tolerance: i64,
    /// Accepted payment method tags
    pub payment_methods: Vec<String>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            allow_overpayment: false,
            overpayment_tolerance: 0,
            payment_methods: vec!["card".to_string(), "bank".to_string()],
        }
    }
}

impl LedgerSettings {
    /// Whether `method` is one of the configured payment methods.
    #[must_use]
    pub fn accepts_method(&self, method: &str) -> bool {
        self.payment_methods.iter().any(|m| m == method)
    }

    /// Checks the policy before it is used to accept payments.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the tolerance is negative, no payment method is
    /// configured, or a method tag is blank.
    pub fn validate(&self) -> Result<()> {
        if self.overpayment_tolerance < 0 {
            return Err(Error::Config {
                message: format!(
                    "ledger.overpayment_tolerance must not be negative (got {})",
                    self.overpayment_tolerance
                ),
            });
        }
        if self.payment_methods.is_empty() {
            return Err(Error::Config {
                message: "ledger.payment_methods must list at least one method".to_string(),
            });
        }
        if self.payment_methods.iter().any(|m| m.trim().is_empty()) {
            return Err(Error::Config {
                message: "ledger.payment_methods must not contain blank entries".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for a new savings group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupConfig {
    /// Group name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Declared number of members; must match `members`
    pub member_count: i32,
    /// Contribution per member per period, in minor units
    pub contribution_amount: i64,
    /// `"weekly"`, `"biweekly"` or `"monthly"`
    pub frequency: String,
    /// ISO-8601 calendar date of the first due date
    pub start_date: String,
    /// Members in join order; the order is the payout rotation
    pub members: Vec<MemberConfig>,
}

/// Configuration for a single group member
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberConfig {
    /// External user reference
    pub user_id: String,
    /// Display name
    pub name: String,
    /// `"coordinator"` or `"member"`
    #[serde(default = "default_role")]
    pub role: String,
    /// ISO-8601 calendar date the member joined
    pub join_date: String,
}

fn default_role() -> String {
    "member".to_string()
}

/// Loads the ledger configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
/// - The `[ledger]` policy fails [`LedgerSettings::validate`]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file {:?}: {e}", path.as_ref()),
    })?;

    let config: Config = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config file {:?}: {e}", path.as_ref()),
    })?;
    config.ledger.validate()?;
    Ok(config)
}

/// Loads the configuration from `CONFIG_PATH`, or `./config.toml` when unset
pub fn load_default_config() -> Result<Config> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_config(path)
}
