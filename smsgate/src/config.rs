//! Configuration module for environment variable parsing.
//!
//! All settings come from environment variables. The webhook secret is the only
//! required one: the service refuses to start without it.

use std::env;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

/// Default SQLite location used when `DATABASE_URL` is unset.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/app.db";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("WEBHOOK_SECRET is not set")]
    MissingSecret,
}

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// SQLite connection URL
    pub database_url: String,

    /// Upper bound on pooled database connections
    pub db_max_connections: u32,

    /// Shared secret used to sign webhook bodies
    pub webhook_secret: String,

    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let webhook_secret = lookup("WEBHOOK_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecret)?;

        Ok(Config {
            port: parse_or(&lookup, "PORT", 8000),

            database_url: lookup("DATABASE_URL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),

            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5),

            webhook_secret,

            log_level: log_level_from_lookup(&lookup),
        })
    }
}

/// Log filter from `LOG_LEVEL`.
///
/// Needed before logging is initialised, so it does not depend on the rest of
/// the configuration being valid.
pub fn log_level_from_env() -> String {
    log_level_from_lookup(&|name: &str| env::var(name).ok())
}

fn log_level_from_lookup<F>(lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup("LOG_LEVEL")
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "info".to_string())
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("db_max_connections", &self.db_max_connections)
            .field("webhook_secret", &"<redacted>")
            .field("log_level", &self.log_level)
            .finish()
    }
}

/// Parse a variable, falling back to `default` when it is absent or invalid.
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = match lookup(name) {
        Some(v) => v,
        None => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}
