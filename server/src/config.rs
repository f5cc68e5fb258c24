//! Server configuration from environment variables
//!
//! ```rust,ignore
//! let config = ArenaConfig::from_env().unwrap_or_default();
//! ```

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const BIND_ADDR_VAR: &str = "ARENA_BIND_ADDR";
pub const REAPER_INTERVAL_VAR: &str = "ARENA_REAPER_INTERVAL_SECS";
pub const SESSION_EXPIRY_VAR: &str = "ARENA_SESSION_EXPIRY_MINUTES";
pub const TEAMS_FILE_VAR: &str = "ARENA_TEAMS_FILE";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8090";
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 300;
const DEFAULT_SESSION_EXPIRY_MINUTES: i64 = 30;

/// One year
pub const MAX_SESSION_EXPIRY_MINUTES: i64 = 525_600;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaConfig {
    /// WebSocket listen address
    pub bind_addr: SocketAddr,

    /// Period of the expired-session sweep
    pub reaper_interval: Duration,

    /// Age after which a battle still waiting for a challenger is removed
    pub session_expiry_minutes: i64,

    /// Optional JSON file used to seed the in-memory team store
    pub teams_file: Option<PathBuf>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            reaper_interval: Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS),
            session_expiry_minutes: DEFAULT_SESSION_EXPIRY_MINUTES,
            teams_file: None,
        }
    }
}

impl ArenaConfig {
    /// Load from the process environment. Unset variables take their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = parse_or(
            BIND_ADDR_VAR,
            lookup(BIND_ADDR_VAR),
            DEFAULT_BIND_ADDR.parse().map_err(|e| invalid(BIND_ADDR_VAR, e))?,
        )?;

        let interval_secs: u64 = parse_or(
            REAPER_INTERVAL_VAR,
            lookup(REAPER_INTERVAL_VAR),
            DEFAULT_REAPER_INTERVAL_SECS,
        )?;
        if interval_secs == 0 {
            return Err(invalid(REAPER_INTERVAL_VAR, "must be at least 1"));
        }

        let session_expiry_minutes: i64 = parse_or(
            SESSION_EXPIRY_VAR,
            lookup(SESSION_EXPIRY_VAR),
            DEFAULT_SESSION_EXPIRY_MINUTES,
        )?;
        if session_expiry_minutes <= 0 {
            return Err(invalid(SESSION_EXPIRY_VAR, "must be positive"));
        }
        if session_expiry_minutes > MAX_SESSION_EXPIRY_MINUTES {
            return Err(invalid(
                SESSION_EXPIRY_VAR,
                format!("must be at most {MAX_SESSION_EXPIRY_MINUTES}"),
            ));
        }

        let teams_file = lookup(TEAMS_FILE_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            bind_addr,
            reaper_interval: Duration::from_secs(interval_secs),
            session_expiry_minutes,
            teams_file,
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.trim().parse().map_err(|e| invalid(key, e)),
        None => Ok(default),
    }
}

fn invalid(key: &str, message: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
