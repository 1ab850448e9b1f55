//! Server Configuration
//!
//! Loaded from a TOML file; every field has a default so a missing file or a
//! partial file is fine.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "QUEST_LEDGER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "quest_ledger.toml";

const BIND_ENV: &str = "QUEST_LEDGER_BIND";
const DATABASE_URL_ENV: &str = "QUEST_LEDGER_DATABASE_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub backend: Backend,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    /// Directory of quest TOML files seeded at startup
    pub catalog_dir: Option<PathBuf>,
    /// tracing-subscriber filter directive, e.g. "quest_ledger=debug"
    pub log_filter: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 2567)),
            database_url: "sqlite:quest_ledger.db?mode=rwc".to_string(),
            backend: Backend::Sqlite,
            max_connections: 5,
            busy_timeout_ms: 5000,
            catalog_dir: None,
            log_filter: None,
        }
    }
}

impl ServerConfig {
    /// Load from `QUEST_LEDGER_CONFIG` (or the default path), then apply env overrides
    pub fn from_env() -> Result<Self, String> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(Path::new(&path))?;

        if let Ok(bind) = std::env::var(BIND_ENV) {
            config.bind_addr = bind
                .parse()
                .map_err(|e| format!("Invalid {} '{}': {}", BIND_ENV, bind, e))?;
        }
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            config.database_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults if it does not exist.
    /// Runs before logging is initialized, so it does not log.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        let config: ServerConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be at least 1".to_string());
        }
        if self.backend == Backend::Sqlite && self.database_url.trim().is_empty() {
            return Err("database_url must be set for the sqlite backend".to_string());
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
