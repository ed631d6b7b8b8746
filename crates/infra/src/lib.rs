//! Infrastructure layer: configuration, Postgres, Redis, external services.

/// Configuration loading and representation.
pub mod config;

/// Organization directory adapters (HTTP client and in-process).
pub mod directory;

/// Postgres-backed stores (sqlx runtime queries).
pub mod postgres;

/// Redis token blacklist.
#[cfg(feature = "redis")]
pub mod redis;

pub use config::{AppConfig, ConfigError, Environment};
pub use directory::{DirectoryError, HttpOrganizationDirectory, LocalOrganizationDirectory};
