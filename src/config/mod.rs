//! Typed configuration from environment variables.
//!
//! Loads once at startup and fails fast if required vars are missing. The
//! database URL is wrapped in `secrecy::SecretString` so it never reaches a
//! log line. Engine tunables may also come from a TOML file named by
//! `HELPDESK_CONFIG`; environment variables win over the file.

use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::reconcile::DEFAULT_BATCH_SIZE;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub tunables: Tunables,
}

/// Engine knobs that are safe to keep in a checked-in file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// Tickets fetched per reconciler page.
    pub reconcile_batch_size: usize,
    /// Buffered events per broadcast subscriber before it starts lagging.
    pub event_channel_capacity: usize,
    /// Postgres pool size.
    pub max_connections: u32,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            reconcile_batch_size: DEFAULT_BATCH_SIZE,
            event_channel_capacity: 256,
            max_connections: 10,
        }
    }
}

impl Tunables {
    /// Read tunables from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Tunables alone, for processes that never touch the database.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// The `HELPDESK_CONFIG` file if named, then per-variable overrides.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut tunables = match var("HELPDESK_CONFIG") {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(n) = parse_var(&var, "RECONCILE_BATCH_SIZE")? {
            tunables.reconcile_batch_size = n;
        }
        if let Some(n) = parse_var(&var, "EVENT_CHANNEL_CAPACITY")? {
            tunables.event_channel_capacity = n;
        }
        if let Some(n) = parse_var(&var, "DATABASE_MAX_CONNECTIONS")? {
            tunables.max_connections = n;
        }
        Ok(tunables)
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = var("DATABASE_URL").ok_or_else(|| {
            Error::Config("required environment variable DATABASE_URL is not set".to_string())
        })?;

        let tunables = Tunables::from_lookup(&var)?;

        Ok(Self {
            database_url: SecretString::from(database_url),
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            tunables,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("{name}={raw:?}: {e}")))
        })
        .transpose()
}
