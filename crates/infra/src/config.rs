//! Runtime configuration.
//!
//! `connection.json` names the two worksheets and tunes the engine; the
//! process environment picks the file, the CSV data directory, the listen
//! address and the log format.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sheetkeeper_inventory::{DEFAULT_FUZZY_THRESHOLD, DEFAULT_OVERLAP_THRESHOLD, MatchPolicy};
use sheetkeeper_observability::{LogFormat, UnknownLogFormat};
use sheetkeeper_schema::SheetRef;

use crate::dedup::DEFAULT_DEDUP_WINDOW_SECS;
use crate::lock::DEFAULT_LOCK_TIMEOUT;

pub const ENV_CONFIG: &str = "SHEETKEEPER_CONFIG";
pub const ENV_DATA_DIR: &str = "SHEETKEEPER_DATA_DIR";
pub const ENV_BIND: &str = "SHEETKEEPER_BIND";
pub const ENV_LOG_FORMAT: &str = "SHEETKEEPER_LOG_FORMAT";

pub const DEFAULT_CONFIG_PATH: &str = "connection.json";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_BIND: &str = "127.0.0.1:8010";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config value: {0}")]
    Invalid(String),
}

fn default_dedup_window_secs() -> u64 {
    DEFAULT_DEDUP_WINDOW_SECS as u64
}

fn default_fuzzy_threshold() -> f64 {
    DEFAULT_FUZZY_THRESHOLD
}

fn default_overlap_threshold() -> f64 {
    DEFAULT_OVERLAP_THRESHOLD
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT.as_millis() as u64
}

/// Contents of `connection.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub inventory: SheetRef,
    pub orders: SheetRef,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl ConnectionConfig {
    pub fn new(inventory: SheetRef, orders: SheetRef) -> Self {
        Self {
            inventory,
            orders,
            dedup_window_secs: default_dedup_window_secs(),
            fuzzy_threshold: default_fuzzy_threshold(),
            overlap_threshold: default_overlap_threshold(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }

    pub fn from_json(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (label, sheet) in [("inventory", &self.inventory), ("orders", &self.orders)] {
            if sheet.workbook_id.trim().is_empty() || sheet.worksheet_name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{label} sheet reference is incomplete")));
            }
        }
        if self.inventory == self.orders {
            return Err(ConfigError::Invalid(
                "inventory and orders must be different worksheets".into(),
            ));
        }
        for (label, value) in [
            ("fuzzy_threshold", self.fuzzy_threshold),
            ("overlap_threshold", self.overlap_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{label} must be within [0, 1]")));
            }
        }
        if self.dedup_window_secs == 0 {
            return Err(ConfigError::Invalid("dedup_window_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dedup_window_secs.min(i64::MAX as u64) as i64)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            fuzzy_threshold: self.fuzzy_threshold,
            overlap_threshold: self.overlap_threshold,
        }
    }
}

/// Process-level settings taken from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub bind: String,
    pub log_format: LogFormat,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup (the environment, or a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let log_format = match get(ENV_LOG_FORMAT) {
            Some(raw) => raw
                .parse()
                .map_err(|e: UnknownLogFormat| ConfigError::Invalid(e.to_string()))?,
            None => LogFormat::default(),
        };
        Ok(Self {
            config_path: get(ENV_CONFIG).unwrap_or_else(|| DEFAULT_CONFIG_PATH.into()).into(),
            data_dir: get(ENV_DATA_DIR).unwrap_or_else(|| DEFAULT_DATA_DIR.into()).into(),
            bind: get(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND.into()),
            log_format,
        })
    }
}
