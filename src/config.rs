//! Configuration module for devnews.

use serde::Deserialize;
use std::path::Path;

use crate::{DevNewsError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/devnews.db".to_string()
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
    "logs/devnews.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Ingestion configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Upper bound on a single source's whole fetch, in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// How many sources are fetched at the same time.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// User-Agent header sent to every source.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Interval between scheduled ingestion runs, in seconds.
    #[serde(default = "default_ingest_interval")]
    pub interval_secs: u64,
}

fn default_fetch_timeout() -> u64 {
    60
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    20
}

fn default_user_agent() -> String {
    "DevNewsAggregator/1.0".to_string()
}

fn default_ingest_interval() -> u64 {
    1800 // 30 minutes
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
            interval_secs: default_ingest_interval(),
        }
    }
}

/// Engagement configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngagementConfig {
    /// Seconds before a pending dismissal becomes permanent.
    #[serde(default = "default_promotion_delay")]
    pub promotion_delay_secs: u64,
    /// Seconds spent retrying a promotion that hit a storage error.
    #[serde(default = "default_promotion_max_retry")]
    pub promotion_max_retry_secs: u64,
}

fn default_promotion_delay() -> u64 {
    15
}

fn default_promotion_max_retry() -> u64 {
    60
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            promotion_delay_secs: default_promotion_delay(),
            promotion_max_retry_secs: default_promotion_max_retry(),
        }
    }
}

/// Cleanup configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Permanently dismissed articles older than this are deleted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Interval between scheduled cleanup passes, in seconds.
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
}

fn default_retention_days() -> u32 {
    30
}

/// Largest accepted `cleanup.retention_days` (one hundred years).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

fn default_cleanup_interval() -> u64 {
    86400 // daily
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            interval_secs: default_cleanup_interval(),
        }
    }
}

/// Kind of news source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Hacker News top stories.
    HackerNews,
    /// Dev.to top articles.
    DevTo,
    /// Hot posts of one subreddit.
    Reddit,
}

/// One configured news source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceConfig {
    /// Provider kind.
    pub kind: SourceKind,
    /// Override of the provider's API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Override of the provider's page size.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Subreddit name (Reddit only).
    #[serde(default)]
    pub subreddit: Option<String>,
}

impl SourceConfig {
    /// A source of the given kind with provider defaults.
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            base_url: None,
            limit: None,
            subreddit: None,
        }
    }

    /// A Reddit source for one subreddit.
    pub fn reddit(subreddit: impl Into<String>) -> Self {
        Self {
            subreddit: Some(subreddit.into()),
            ..Self::new(SourceKind::Reddit)
        }
    }

    /// Set the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

const DEFAULT_SUBREDDITS: &[&str] = &[
    "programming",
    "webdev",
    "javascript",
    "ruby",
    "rust",
    "netsec",
    "cybersecurity",
    "technology",
    "MachineLearning",
    "artificial",
    "LocalLLaMA",
];

fn default_sources() -> Vec<SourceConfig> {
    let mut sources = vec![
        SourceConfig::new(SourceKind::HackerNews),
        SourceConfig::new(SourceKind::DevTo),
    ];
    sources.extend(DEFAULT_SUBREDDITS.iter().map(|s| SourceConfig::reddit(*s)));
    sources
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Ingestion configuration.
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Engagement configuration.
    #[serde(default)]
    pub engagement: EngagementConfig,
    /// Cleanup configuration.
    #[serde(default)]
    pub cleanup: CleanupConfig,
    /// News sources, fetched on every ingestion run.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            ingest: IngestConfig::default(),
            engagement: EngagementConfig::default(),
            cleanup: CleanupConfig::default(),
            sources: default_sources(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(DevNewsError::Io)?;
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
        toml::from_str(s).map_err(|e| DevNewsError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `DEVNEWS_DATABASE_PATH`: Override the database path
    /// - `DEVNEWS_LOG_LEVEL`: Override the log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("DEVNEWS_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(level) = std::env::var("DEVNEWS_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - Any ingestion timeout or the fetch concurrency is zero
    /// - The promotion delay or a scheduler interval is zero
    /// - The cleanup retention exceeds [`MAX_RETENTION_DAYS`]
    /// - A Reddit source has no subreddit
    pub fn validate(&self) -> Result<()> {
        let ingest = &self.ingest;
        if ingest.fetch_timeout_secs == 0
            || ingest.connect_timeout_secs == 0
            || ingest.request_timeout_secs == 0
        {
            return Err(DevNewsError::Config(
                "ingest timeouts must be greater than zero".to_string(),
            ));
        }
        if ingest.max_concurrent_fetches == 0 {
            return Err(DevNewsError::Config(
                "ingest.max_concurrent_fetches must be greater than zero".to_string(),
            ));
        }
        if ingest.interval_secs == 0 || self.cleanup.interval_secs == 0 {
            return Err(DevNewsError::Config(
                "scheduler intervals must be greater than zero".to_string(),
            ));
        }
        if self.engagement.promotion_delay_secs == 0 {
            return Err(DevNewsError::Config(
                "engagement.promotion_delay_secs must be greater than zero".to_string(),
            ));
        }
        if self.cleanup.retention_days > MAX_RETENTION_DAYS {
            return Err(DevNewsError::Config(format!(
                "cleanup.retention_days must be at most {}",
                MAX_RETENTION_DAYS
            )));
        }
        for (i, source) in self.sources.iter().enumerate() {
            if source.kind == SourceKind::Reddit
                && source.subreddit.as_deref().map_or(true, str::is_empty)
            {
                return Err(DevNewsError::Config(format!(
                    "sources[{i}]: reddit source requires a subreddit"
                )));
            }
            if source.limit == Some(0) {
                return Err(DevNewsError::Config(format!(
                    "sources[{i}]: limit must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}
