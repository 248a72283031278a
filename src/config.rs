//! Configuration module for the notice board.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{NoticeboardError, Result};

/// Upper bound for the refresh and scheduler intervals (one year).
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/noticeboard.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/noticeboard.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// RSS ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RssConfig {
    /// How often the scheduler looks for eligible feeds, in seconds.
    #[serde(default = "default_rss_scheduler_interval")]
    pub scheduler_interval_secs: u64,
    /// Minimum time between two scheduled fetches of one feed, in seconds.
    #[serde(default = "default_rss_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Consecutive errors at which a feed is classified Critical.
    #[serde(default = "default_rss_critical_threshold")]
    pub critical_error_threshold: i64,
    /// Connection timeout in seconds.
    #[serde(default = "default_rss_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_rss_read_timeout")]
    pub read_timeout_secs: u64,
    /// Maximum number of redirects followed per fetch.
    #[serde(default = "default_rss_max_redirects")]
    pub max_redirects: usize,
    /// Maximum response body size in bytes.
    #[serde(default = "default_rss_max_response_bytes")]
    pub max_response_bytes: u64,
    /// User agent sent with every request.
    #[serde(default = "default_rss_user_agent")]
    pub user_agent: String,
    /// Number of fetch cycles allowed to run at the same time.
    #[serde(default = "default_rss_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    /// Retries of a cycle after an infrastructure failure.
    #[serde(default = "default_rss_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay before the first retry, in seconds. Doubles on each retry.
    #[serde(default = "default_rss_retry_base_delay")]
    pub retry_base_delay_secs: u64,
    /// Whether operator-triggered refresh/preview skips Critical feeds.
    ///
    /// Off by default: an operator can always force-retry a broken feed.
    #[serde(default)]
    pub manual_refresh_respects_health_gate: bool,
    /// Number of items returned by a preview.
    #[serde(default = "default_rss_preview_item_limit")]
    pub preview_item_limit: usize,
    /// Number of items shown on the dashboard.
    #[serde(default = "default_rss_dashboard_item_limit")]
    pub dashboard_item_limit: usize,
}

fn default_rss_scheduler_interval() -> u64 {
    300 // 5 minutes
}

fn default_rss_refresh_interval() -> u64 {
    3600 // 1 hour
}

fn default_rss_critical_threshold() -> i64 {
    3
}

fn default_rss_connect_timeout() -> u64 {
    10
}

fn default_rss_read_timeout() -> u64 {
    15
}

fn default_rss_max_redirects() -> usize {
    3
}

fn default_rss_max_response_bytes() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_rss_user_agent() -> String {
    "Noticeboard-RSS-Reader/1.0".to_string()
}

fn default_rss_max_concurrent_fetches() -> usize {
    5
}

fn default_rss_retry_attempts() -> u32 {
    3
}

fn default_rss_retry_base_delay() -> u64 {
    10
}

fn default_rss_preview_item_limit() -> usize {
    10
}

fn default_rss_dashboard_item_limit() -> usize {
    50
}

impl Default for RssConfig {
    fn default() -> Self {
        Self {
            scheduler_interval_secs: default_rss_scheduler_interval(),
            refresh_interval_secs: default_rss_refresh_interval(),
            critical_error_threshold: default_rss_critical_threshold(),
            connect_timeout_secs: default_rss_connect_timeout(),
            read_timeout_secs: default_rss_read_timeout(),
            max_redirects: default_rss_max_redirects(),
            max_response_bytes: default_rss_max_response_bytes(),
            user_agent: default_rss_user_agent(),
            max_concurrent_fetches: default_rss_max_concurrent_fetches(),
            retry_attempts: default_rss_retry_attempts(),
            retry_base_delay_secs: default_rss_retry_base_delay(),
            manual_refresh_respects_health_gate: false,
            preview_item_limit: default_rss_preview_item_limit(),
            dashboard_item_limit: default_rss_dashboard_item_limit(),
        }
    }
}

impl RssConfig {
    /// Refresh interval as a chrono duration, for eligibility arithmetic.
    ///
    /// Values above [`MAX_INTERVAL_SECS`] are clamped; `validate` rejects them.
    pub fn refresh_interval(&self) -> chrono::Duration {
        let secs = i64::try_from(self.refresh_interval_secs.min(MAX_INTERVAL_SECS)).unwrap_or(0);
        chrono::TimeDelta::try_seconds(secs).unwrap_or_else(chrono::TimeDelta::zero)
    }

    /// Scheduler tick period.
    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs.clamp(1, MAX_INTERVAL_SECS))
    }

    /// Delay before the first retry.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// RSS ingestion configuration.
    #[serde(default)]
    pub rss: RssConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(NoticeboardError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| NoticeboardError::Config(format!("parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `NOTICEBOARD_DATABASE_PATH`: Override the database file path
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("NOTICEBOARD_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let rss = &self.rss;
        if rss.critical_error_threshold < 1 {
            return Err(NoticeboardError::Config(
                "rss.critical_error_threshold must be at least 1".to_string(),
            ));
        }
        if rss.max_response_bytes == 0 {
            return Err(NoticeboardError::Config(
                "rss.max_response_bytes must be greater than 0".to_string(),
            ));
        }
        if rss.max_concurrent_fetches == 0 {
            return Err(NoticeboardError::Config(
                "rss.max_concurrent_fetches must be greater than 0".to_string(),
            ));
        }
        if rss.scheduler_interval_secs == 0 || rss.scheduler_interval_secs > MAX_INTERVAL_SECS {
            return Err(NoticeboardError::Config(format!(
                "rss.scheduler_interval_secs must be between 1 and {MAX_INTERVAL_SECS}"
            )));
        }
        if rss.refresh_interval_secs > MAX_INTERVAL_SECS {
            return Err(NoticeboardError::Config(format!(
                "rss.refresh_interval_secs must be at most {MAX_INTERVAL_SECS}"
            )));
        }
        if rss.connect_timeout_secs == 0 {
            return Err(NoticeboardError::Config(
                "rss.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if rss.read_timeout_secs == 0 {
            return Err(NoticeboardError::Config(
                "rss.read_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if rss.user_agent.trim().is_empty() {
            return Err(NoticeboardError::Config(
                "rss.user_agent must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
