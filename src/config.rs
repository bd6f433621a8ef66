//! Configuration module for the notifier.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{NotifierError, Result};

/// Browser-like user agent; some listing hosts reject default HTTP clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (iPad; CPU OS 12_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148";

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// sqlx connection string.
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://ipbes_notifier.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

/// Poll scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Seconds between ticks; fractions are allowed.
    #[serde(default = "default_poll_interval")]
    pub interval_secs: f64,
    /// Seconds before the first tick.
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    /// Upper bound for a single topic fetch.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Upper bound for a single message delivery.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
    /// Keep the seen-set in the database so it survives restarts.
    #[serde(default = "default_persist_seen")]
    pub persist_seen: bool,
    /// Record the first listing of a topic without notifying anyone.
    #[serde(default)]
    pub baseline_new_topics: bool,
    /// Number of pending dispatch jobs before pipelines wait.
    #[serde(default = "default_dispatch_queue_capacity")]
    pub dispatch_queue_capacity: usize,
}

fn default_poll_interval() -> f64 {
    60.0
}

fn default_initial_delay() -> u64 {
    5
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_send_timeout() -> u64 {
    10
}

fn default_persist_seen() -> bool {
    true
}

fn default_dispatch_queue_capacity() -> usize {
    64
}

impl PollConfig {
    /// The tick period, or `None` if `interval_secs` is not a positive
    /// duration.
    pub fn interval(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.interval_secs)
            .ok()
            .filter(|interval| !interval.is_zero())
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval(),
            initial_delay_secs: default_initial_delay(),
            fetch_timeout_secs: default_fetch_timeout(),
            send_timeout_secs: default_send_timeout(),
            persist_seen: default_persist_seen(),
            baseline_new_topics: false,
            dispatch_queue_capacity: default_dispatch_queue_capacity(),
        }
    }
}

/// Listing fetch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Maximum accepted body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
    /// Maximum number of redirects to follow.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// CSS selector matching one listing entry.
    #[serde(default = "default_entry_selector")]
    pub entry_selector: String,
    /// CSS selector for the document symbol inside an entry.
    #[serde(default = "default_symbol_selector")]
    pub symbol_selector: String,
    /// CSS selector for the document title inside an entry.
    #[serde(default = "default_title_selector")]
    pub title_selector: String,
    /// Language tag the scraped title is stored under.
    #[serde(default = "default_title_language")]
    pub title_language: String,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_body_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_max_redirects() -> usize {
    5
}

fn default_entry_selector() -> String {
    ".card-title".to_string()
}

fn default_symbol_selector() -> String {
    ".field--name-name".to_string()
}

fn default_title_selector() -> String {
    ".field--name-field-document-name".to_string()
}

fn default_title_language() -> String {
    "en".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_secs: default_connect_timeout(),
            max_body_bytes: default_max_body_bytes(),
            max_redirects: default_max_redirects(),
            entry_selector: default_entry_selector(),
            symbol_selector: default_symbol_selector(),
            title_selector: default_title_selector(),
            title_language: default_title_language(),
        }
    }
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    #[serde(default)]
    pub token: String,
    /// Base URL of the Bot API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Long polling timeout for getUpdates, in seconds.
    #[serde(default = "default_long_poll_timeout")]
    pub long_poll_timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_long_poll_timeout() -> u64 {
    30
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_api_url(),
            long_poll_timeout_secs: default_long_poll_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; empty logs to the console only.
    #[serde(default)]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: String::new(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Poll scheduler configuration.
    #[serde(default)]
    pub poll: PollConfig,
    /// Listing fetch configuration.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Telegram configuration.
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(NotifierError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file if it exists, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| NotifierError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `DATABASE_URL`: database connection string
    /// - `TOKEN`: Telegram bot token
    /// - `POLL_INTERVAL`: poll interval in seconds
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = url;
            }
        }
        if let Ok(token) = std::env::var("TOKEN") {
            if !token.is_empty() {
                self.telegram.token = token;
            }
        }
        if let Ok(interval) = std::env::var("POLL_INTERVAL") {
            match interval.parse() {
                Ok(secs) => self.poll.interval_secs = secs,
                Err(_) => tracing::warn!("Ignoring invalid POLL_INTERVAL: {}", interval),
            }
        }
    }

    /// Validate the configuration required to run the notifier.
    ///
    /// Returns an error if the token is missing, an interval or timeout is
    /// zero, or a listing selector does not parse.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.token.trim().is_empty() {
            return Err(NotifierError::Config(
                "telegram token is not set. Set it in config.toml, via TOKEN, or on the command line."
                    .to_string(),
            ));
        }
        if self.poll.interval().is_none() {
            return Err(NotifierError::Config(
                "poll interval must be a positive number of seconds".to_string(),
            ));
        }
        if self.poll.fetch_timeout_secs == 0 || self.poll.send_timeout_secs == 0 {
            return Err(NotifierError::Config(
                "fetch and send timeouts must be greater than zero".to_string(),
            ));
        }
        if self.poll.dispatch_queue_capacity == 0 {
            return Err(NotifierError::Config(
                "dispatch queue capacity must be greater than zero".to_string(),
            ));
        }
        crate::notifier::ListingSelectors::from_config(&self.fetch)?;
        url::Url::parse(&self.telegram.api_url)
            .map_err(|e| NotifierError::Config(format!("invalid telegram api_url: {e}")))?;
        Ok(())
    }
}
