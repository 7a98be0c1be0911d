//! Configuration loading — TOML file with environment variable overrides.
//!
//! The file is optional and every field has a default. Environment variables
//! take precedence over file values:
//!
//! | Variable | Field |
//! |---|---|
//! | `SAKIT_DATABASE_URL` | `database.url` |
//! | `SAKIT_MAX_CONNECTIONS` | `database.max_connections` |

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::error::SqliteError;
use crate::storage::SqliteStorage;

/// Name of the database when none is configured.
pub const DEFAULT_DATABASE_NAME: &str = "smart-account-kit";

/// URL of a private in-memory database.
pub const IN_MEMORY_URL: &str = "sqlite::memory:";

const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Configuration for the `SQLite` storage adapter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `SQLite` connection URL (e.g. `sqlite:smart-account-kit.db` or `sqlite::memory:`).
    #[serde(rename = "url")]
    pub database_url: String,
    /// Upper bound of pooled connections. In-memory databases always use one.
    pub max_connections: u32,
}

/// Layout of the TOML configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    database: Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: format!("sqlite:{DEFAULT_DATABASE_NAME}.db"),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Config {
    /// A private in-memory database, discarded on close.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            database_url: IN_MEMORY_URL.to_string(),
            ..Self::default()
        }
    }

    /// A database file named `<name>.db` inside `directory`.
    #[must_use]
    pub fn in_directory(directory: impl AsRef<Path>, name: &str) -> Self {
        let path = directory.as_ref().join(format!("{name}.db"));
        Self {
            database_url: format!("sqlite://{}", path.display()),
            ..Self::default()
        }
    }

    /// Read configuration from environment variables over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the resulting values are invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the TOML file at `path` (if present), then
    /// apply environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the resulting values are invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path.as_ref())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.database)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("SAKIT_DATABASE_URL") {
            self.database_url = val;
        }
        if let Some(val) = lookup("SAKIT_MAX_CONNECTIONS") {
            if let Ok(max) = val.parse() {
                self.max_connections = max;
            }
        }
    }

    /// Check the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for an empty URL or a zero
    /// connection limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Validation("database url must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Validation("max_connections must be non-zero"));
        }
        Ok(())
    }

    /// Whether the URL designates an in-memory database.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Path of the database file, or `None` for in-memory databases.
    #[must_use]
    pub fn database_path(&self) -> Option<PathBuf> {
        if self.is_in_memory() {
            return None;
        }
        let rest = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))
            .unwrap_or(&self.database_url);
        let path = rest.split_once('?').map_or(rest, |(path, _)| path);
        (!path.is_empty()).then(|| PathBuf::from(path))
    }

    /// Build the connect options, creating the database file when missing.
    pub(crate) fn connect_options(&self) -> Result<SqliteConnectOptions, SqliteError> {
        Ok(SqliteConnectOptions::from_str(&self.database_url)?.create_if_missing(true))
    }

    pub(crate) fn pool_options(&self) -> SqlitePoolOptions {
        if self.is_in_memory() {
            // The database lives as long as its single connection does.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(self.max_connections)
        }
    }

    /// Build a [`SqliteStorage`] from this configuration.
    ///
    /// No connection is made until the first operation.
    #[must_use]
    pub fn build(self) -> SqliteStorage {
        SqliteStorage::new(self)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(&'static str),
}
