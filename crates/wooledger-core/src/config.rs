//! Runtime configuration.
//!
//! Settings come from three layers, later ones winning: built-in defaults, a
//! JSON file, and `WOOLEDGER_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable overriding [`Config::database_path`].
pub const ENV_DATABASE: &str = "WOOLEDGER_DATABASE";
/// Environment variable overriding [`Config::archive_dir`].
pub const ENV_ARCHIVE_DIR: &str = "WOOLEDGER_ARCHIVE_DIR";
/// Environment variable overriding [`Config::dependency_timeout_ms`].
pub const ENV_TIMEOUT_MS: &str = "WOOLEDGER_TIMEOUT_MS";
/// Environment variable overriding [`Config::actor`].
pub const ENV_ACTOR: &str = "WOOLEDGER_ACTOR";

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `SQLite` database holding the index, requests, and audit log.
    pub database_path: PathBuf,
    /// Root of the content-addressed archive.
    pub archive_dir: PathBuf,
    /// Deadline for each index or archive call, in milliseconds.
    pub dependency_timeout_ms: u64,
    /// Actor recorded in audit entries.
    pub actor: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = Self::data_dir();
        Self {
            database_path: data_dir.join("wooledger.db"),
            archive_dir: data_dir.join("archive"),
            dependency_timeout_ms: 5000,
            actor: "system".to_string(),
        }
    }
}

impl Config {
    /// Default data directory, `<data_dir>/wooledger`.
    #[must_use]
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wooledger")
    }

    /// Default configuration file, `<config_dir>/wooledger/config.json`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wooledger")
            .join("config.json")
    }

    /// Loads configuration from `path`, or the default file if it exists,
    /// then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `Config` if an explicitly named file is missing, any file is
    /// malformed, or an override has an invalid value.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read(path).await?,
            None => Self::read_or_default(&Self::default_path()).await?,
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Reads `path` if it exists, otherwise returns the defaults.
    async fn read_or_default(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path).await? {
            Self::read(path).await
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    async fn read(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_json(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parses a JSON document; absent fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Serde` if the document is malformed.
    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Applies `WOOLEDGER_*` overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the timeout override is not a number.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup(ENV_DATABASE) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(ENV_ARCHIVE_DIR) {
            self.archive_dir = PathBuf::from(dir);
        }
        if let Some(ms) = lookup(ENV_TIMEOUT_MS) {
            self.dependency_timeout_ms = ms
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("{ENV_TIMEOUT_MS}={ms:?}: {e}")))?;
        }
        if let Some(actor) = lookup(ENV_ACTOR) {
            self.actor = actor;
        }
        Ok(())
    }

    /// Deadline for dependency calls.
    #[must_use]
    pub const fn dependency_timeout(&self) -> Duration {
        Duration::from_millis(self.dependency_timeout_ms)
    }

    /// Database path as a string, as the `SQLite` URL needs it.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the path is not valid UTF-8.
    pub fn database_url_path(&self) -> Result<&str> {
        self.database_path.to_str().ok_or_else(|| {
            Error::Config(format!(
                "database path is not valid UTF-8: {}",
                self.database_path.display()
            ))
        })
    }
}
