//! Ledger configuration.
//!
//! Loaded with env var > config.toml > default priority. The config file
//! lives at `~/.agent-ledger/config.toml` unless a path is given, and a
//! `.env` in the working directory is honored.
//!
//! ```toml
//! [store]
//! backend = "file"
//! path = "/var/lib/agent-ledger/ledger.json"
//!
//! [limits]
//! max_uri_len = 200
//!
//! [events]
//! capacity = 256
//!
//! [log]
//! filter = "agent_ledger=debug"
//! json = true
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::store::FileStore;

const ENV_STORE: &str = "AGENT_LEDGER_STORE";
const ENV_STORE_PATH: &str = "AGENT_LEDGER_STORE_PATH";
const ENV_MAX_URI_LEN: &str = "AGENT_LEDGER_MAX_URI_LEN";
const ENV_EVENT_CAPACITY: &str = "AGENT_LEDGER_EVENT_CAPACITY";
const ENV_LOG: &str = "AGENT_LEDGER_LOG";
const ENV_LOG_JSON: &str = "AGENT_LEDGER_LOG_JSON";

/// Top-level ledger configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Storage backend.
    #[serde(default)]
    pub store: StoreConfig,

    /// Size bounds on caller-supplied strings.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Event feed configuration.
    #[serde(default)]
    pub events: EventsConfig,

    /// Logging configuration (used by the binary).
    #[serde(default)]
    pub log: LogConfig,
}

/// Which keyed store backs the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Volatile in-process map.
    #[default]
    Memory,
    /// JSON snapshot on disk.
    File,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Snapshot path for the file backend. Defaults to `~/.agent-ledger/ledger.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Snapshot path, falling back to the default location.
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(FileStore::default_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum byte length of metadata and evidence URIs.
    #[serde(default = "default_max_uri_len")]
    pub max_uri_len: usize,
}

fn default_max_uri_len() -> usize {
    200
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_uri_len: default_max_uri_len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast buffer size. Slow subscribers lag past this many events.
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "agent_ledger=info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl LedgerConfig {
    /// Default config file path (`~/.agent-ledger/config.toml`).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agent-ledger")
            .join("config.toml")
    }

    /// Load configuration from `path` (or the default location), then apply
    /// `.env` and process environment overrides.
    ///
    /// A missing default file is not an error; a missing explicit file is.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.is_file() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overlay `AGENT_LEDGER_*` variables resolved through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_STORE) {
            self.store.backend = value.parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_STORE,
                value,
            })?;
        }

        if let Some(value) = lookup(ENV_STORE_PATH) {
            self.store.path = Some(PathBuf::from(value));
        }

        if let Some(value) = lookup(ENV_MAX_URI_LEN) {
            self.limits.max_uri_len = parse_env(ENV_MAX_URI_LEN, value)?;
        }

        if let Some(value) = lookup(ENV_EVENT_CAPACITY) {
            let capacity: usize = parse_env(ENV_EVENT_CAPACITY, value.clone())?;
            if capacity == 0 {
                return Err(ConfigError::InvalidEnv {
                    key: ENV_EVENT_CAPACITY,
                    value,
                });
            }
            self.events.capacity = capacity;
        }

        if let Some(value) = lookup(ENV_LOG) {
            self.log.filter = value;
        }

        if let Some(value) = lookup(ENV_LOG_JSON) {
            self.log.json = parse_env(ENV_LOG_JSON, value)?;
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { key, value })
}
