//! Application settings loaded from environment variables.

use std::env;

use super::constants::{DEFAULT_BULK_TIMEOUT_SECS, DEFAULT_DATABASE_URL};

/// Data-access configuration
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    /// Per-statement timeout applied to bulk operations when the caller does
    /// not pass one explicitly.
    pub bulk_timeout_secs: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bulk_timeout_secs", &self.bulk_timeout_secs)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// development defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            bulk_timeout_secs: env::var("BULK_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_BULK_TIMEOUT_SECS),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bulk_timeout_secs: DEFAULT_BULK_TIMEOUT_SECS,
        }
    }
}
