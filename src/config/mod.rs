/// Database configuration and connection management
pub mod database;

/// Ledger settings and seed groups loaded from config.toml
pub mod settings;
