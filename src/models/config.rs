//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and cycle behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Imageboard endpoint templates
    #[serde(default)]
    pub api: ApiConfig,

    /// Disk staging area for files that need conversion
    #[serde(default)]
    pub staging: StagingConfig,

    /// Periodic trigger settings
    #[serde(default)]
    pub poller: PollerConfig,

    /// Where files go once matched
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Subscription store location
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.crawler.cycle_deadline_secs == 0 {
            return Err(AppError::validation(
                "crawler.cycle_deadline_secs must be > 0",
            ));
        }
        self.api.validate()?;
        if self.staging.max_space_bytes == 0 {
            return Err(AppError::validation("staging.max_space_bytes must be > 0"));
        }
        if self.poller.interval_secs == 0 {
            return Err(AppError::validation("poller.interval_secs must be > 0"));
        }
        if let Some(webhook) = &self.delivery.webhook_url {
            url::Url::parse(webhook)?;
        }
        Ok(())
    }
}

/// HTTP client and cycle behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent thread fetches per board
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Upper bound on a whole sync cycle
    #[serde(default = "defaults::cycle_deadline")]
    pub cycle_deadline_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
            cycle_deadline_secs: defaults::cycle_deadline(),
        }
    }
}

/// Imageboard endpoint templates.
///
/// Placeholders: `{board}`, `{thread}` and `{path}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "defaults::threads_url")]
    pub threads_url: String,

    #[serde(default = "defaults::thread_url")]
    pub thread_url: String,

    #[serde(default = "defaults::resource_url")]
    pub resource_url: String,
}

impl ApiConfig {
    fn validate(&self) -> Result<()> {
        let templates = [
            ("api.threads_url", &self.threads_url, "{board}"),
            ("api.thread_url", &self.thread_url, "{thread}"),
            ("api.resource_url", &self.resource_url, "{path}"),
        ];
        for (name, template, placeholder) in templates {
            if !template.contains(placeholder) {
                return Err(AppError::validation(format!(
                    "{name} must contain {placeholder}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            threads_url: defaults::threads_url(),
            thread_url: defaults::thread_url(),
            resource_url: defaults::resource_url(),
        }
    }
}

/// Disk staging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    #[serde(default = "defaults::staging_path")]
    pub path: PathBuf,

    /// Byte budget for staged files
    #[serde(default = "defaults::max_space")]
    pub max_space_bytes: u64,

    /// How long a delivery waits for staging space before giving up
    #[serde(default = "defaults::reserve_wait")]
    pub reserve_wait_secs: u64,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            path: defaults::staging_path(),
            max_space_bytes: defaults::max_space(),
            reserve_wait_secs: defaults::reserve_wait(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
        }
    }
}

/// Delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// POST deliveries here as JSON; log them when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Convert `.webm` files to `.mp4` before sending
    #[serde(default = "defaults::convert_webm")]
    pub convert_webm: bool,

    /// Transcoder executable
    #[serde(default = "defaults::ffmpeg")]
    pub ffmpeg_path: PathBuf,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            convert_webm: defaults::convert_webm(),
            ffmpeg_path: defaults::ffmpeg(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding users, subscriptions and the cursor
    #[serde(default = "defaults::store_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: defaults::store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; threadwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        8
    }
    pub fn cycle_deadline() -> u64 {
        240
    }

    // API defaults
    pub fn threads_url() -> String {
        "https://2ch.hk/{board}/threads.json".into()
    }
    pub fn thread_url() -> String {
        "https://2ch.hk/{board}/res/{thread}.json".into()
    }
    pub fn resource_url() -> String {
        "https://2ch.hk{path}".into()
    }

    // Staging defaults
    pub fn staging_path() -> PathBuf {
        PathBuf::from("data/staging")
    }
    pub fn max_space() -> u64 {
        512 * 1024 * 1024
    }
    pub fn reserve_wait() -> u64 {
        120
    }

    pub fn interval() -> u64 {
        300
    }

    pub fn convert_webm() -> bool {
        true
    }
    pub fn ffmpeg() -> PathBuf {
        PathBuf::from("ffmpeg")
    }

    pub fn store_path() -> PathBuf {
        PathBuf::from("data/store.json")
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
