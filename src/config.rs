//! Server configuration
//!
//! Loaded from a TOML file (`dbagent.toml` by default). A `[server]` table
//! holds process settings and each `[catalogs.<name>]` table describes one
//! datasource clients can open sessions on.
//!
//! ## Environment Variables
//!
//! - `DBAGENT_LISTEN` - listen address, overrides `server.listen`
//! - `DBAGENT_REAP_INTERVAL_MS` - reaper sweep interval
//!
//! These can be set in a `.env` file next to the binary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{ServerError, ServerResult};

pub const CONFIG_FILE_NAME: &str = "dbagent.toml";

pub const ENV_LISTEN: &str = "DBAGENT_LISTEN";
pub const ENV_REAP_INTERVAL_MS: &str = "DBAGENT_REAP_INTERVAL_MS";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub catalogs: BTreeMap<String, CatalogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Period between reaper sweeps
    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,
    /// Idle timeout applied when a client connects without one
    #[serde(default = "default_idle_timeout_ms")]
    pub default_idle_timeout_ms: u64,
}

fn default_listen() -> String {
    "0.0.0.0:6543".to_string()
}

fn default_reap_interval_ms() -> u64 {
    1_000
}

fn default_idle_timeout_ms() -> u64 {
    600_000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            reap_interval_ms: default_reap_interval_ms(),
            default_idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl ServerSettings {
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms.max(1))
    }

    pub fn default_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.default_idle_timeout_ms)
    }
}

/// One datasource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Driver identity; only `sqlite` is built in
    #[serde(default = "default_driver")]
    pub driver: String,
    /// Database location (a file path, or `:memory:`)
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    #[serde(default)]
    pub min_idle: Option<u32>,
    /// Run on every checkout; a failing query discards the physical connection
    #[serde(default)]
    pub validation_query: Option<String>,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Idle physical connections are closed after this long
    #[serde(default)]
    pub idle_eviction_ms: Option<u64>,
    #[serde(default)]
    pub max_lifetime_ms: Option<u64>,
}

fn default_driver() -> String {
    "sqlite".to_string()
}

fn default_max_size() -> u32 {
    10
}

fn default_connection_timeout_ms() -> u64 {
    5_000
}

impl CatalogConfig {
    pub fn sqlite(url: impl Into<String>) -> Self {
        Self {
            driver: default_driver(),
            url: url.into(),
            user: None,
            password: None,
            max_size: default_max_size(),
            min_idle: None,
            validation_query: None,
            connection_timeout_ms: default_connection_timeout_ms(),
            idle_eviction_ms: None,
            max_lifetime_ms: None,
        }
    }

    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.user = Some(user.to_string());
        self.password = Some(password.to_string());
        self
    }
}

impl Config {
    /// Load and validate `path`, then apply environment overrides
    pub fn load(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn parse(content: &str) -> ServerResult<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ServerResult<()> {
        for (name, catalog) in &self.catalogs {
            if catalog.driver != "sqlite" {
                return Err(ServerError::Config(format!(
                    "Catalog '{}': unsupported driver '{}'",
                    name, catalog.driver
                )));
            }
            if catalog.max_size == 0 {
                return Err(ServerError::Config(format!(
                    "Catalog '{}': max_size must be at least 1",
                    name
                )));
            }
            if catalog.min_idle.is_some_and(|min| min > catalog.max_size) {
                return Err(ServerError::Config(format!(
                    "Catalog '{}': min_idle exceeds max_size",
                    name
                )));
            }
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(listen) = std::env::var(ENV_LISTEN) {
            if !listen.is_empty() {
                self.server.listen = listen;
            }
        }

        if let Ok(interval) = std::env::var(ENV_REAP_INTERVAL_MS) {
            if let Ok(ms) = interval.parse::<u64>() {
                self.server.reap_interval_ms = ms;
            }
        }
    }
}
