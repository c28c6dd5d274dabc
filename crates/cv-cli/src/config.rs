//! Application configuration, loaded from a single JSON file.
//!
//! Field names mirror the file keys verbatim. An unknown interval code, a
//! malformed date or broken JSON is fatal before any network or disk I/O.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use cv_client::RateLimitConfig;
use cv_core::interval::Interval;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub symbols: Vec<String>,
    pub intervals: Vec<Interval>,
    pub bootstrap: BootstrapConfig,
    pub rate_limit: RateLimitConfig,
    pub http: HttpConfig,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapConfig {
    /// ISO-8601 UTC instant the history begins at.
    pub start_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, serde_json::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "cannot read {}: {e}", path.display()),
            ConfigError::Parse(path, e) => write!(f, "invalid config {}: {e}", path.display()),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let cfg: AppConfig =
            serde_json::from_str(&data).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("symbols must not be empty".into()));
        }
        if self.intervals.is_empty() {
            return Err(ConfigError::Invalid("intervals must not be empty".into()));
        }
        if self.rate_limit.requests_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "rateLimit.requestsPerMinute must be positive".into(),
            ));
        }
        if self.rate_limit.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "rateLimit.maxConcurrent must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn start_ms(&self) -> i64 {
        self.bootstrap.start_date.timestamp_millis()
    }
}
