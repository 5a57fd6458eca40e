//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/mixlite/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/mixlite/` (~/.config/mixlite/)
//! - Data: `$XDG_DATA_HOME/mixlite/` (~/.local/share/mixlite/)
//! - State/Logs: `$XDG_STATE_HOME/mixlite/` (~/.local/state/mixlite/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default endpoint for event transactions
pub const DEFAULT_TRACKING_URL: &str = "https://api.mixpanel.com/track";

/// Default endpoint for profile updates
pub const DEFAULT_ENGAGE_URL: &str = "https://api.mixpanel.com/engage";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Client and delivery settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Durable store location
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Options accepted by [`crate::Client::init`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    /// Log every public call at info level
    pub debug: bool,
    /// Start muted: every call becomes a logged no-op
    pub mute: bool,
    /// Override for the event endpoint
    pub tracking_url: Option<String>,
    /// Override for the profile-update endpoint
    pub engage_url: Option<String>,
}

/// Client configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Project token (can also be passed on the command line)
    pub token: Option<String>,

    /// Verbose per-call logging
    #[serde(default)]
    pub debug: bool,

    /// Start muted
    #[serde(default)]
    pub mute: bool,

    /// Event endpoint
    #[serde(default = "default_tracking_url")]
    pub tracking_url: String,

    /// Profile-update endpoint
    #[serde(default = "default_engage_url")]
    pub engage_url: String,

    /// Maximum pending transactions before the oldest are evicted
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Delay before a coalesced follow-up drain runs
    #[serde(default = "default_redrain_delay_ms")]
    pub redrain_delay_ms: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: None,
            debug: false,
            mute: false,
            tracking_url: default_tracking_url(),
            engage_url: default_engage_url(),
            queue_capacity: default_queue_capacity(),
            redrain_delay_ms: default_redrain_delay_ms(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ClientConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config(
                "client.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "client.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        validate_endpoint("client.tracking_url", &self.tracking_url)?;
        validate_endpoint("client.engage_url", &self.engage_url)?;
        Ok(())
    }

    /// Options to pass to `Client::init`
    pub fn init_options(&self) -> InitOptions {
        InitOptions {
            debug: self.debug,
            mute: self.mute,
            tracking_url: Some(self.tracking_url.clone()),
            engage_url: Some(self.engage_url.clone()),
        }
    }

    pub fn redrain_delay(&self) -> Duration {
        Duration::from_millis(self.redrain_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Check that an endpoint is an absolute http(s) URL.
pub fn validate_endpoint(name: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| Error::Config(format!("{} is not a valid URL: {}", name, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::Config(format!(
            "{} must use http or https, got {}",
            name, other
        ))),
    }
}

fn default_tracking_url() -> String {
    DEFAULT_TRACKING_URL.to_string()
}

fn default_engage_url() -> String {
    DEFAULT_ENGAGE_URL.to_string()
}

fn default_queue_capacity() -> usize {
    crate::queue::DEFAULT_CAPACITY
}

fn default_redrain_delay_ms() -> u64 {
    500
}

fn default_request_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Durable store configuration
#[derive(Debug, Deserialize, Default)]
pub struct StorageConfig {
    /// Override path for the SQLite store
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.client.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/mixlite/config.toml` (~/.config/mixlite/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("mixlite").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite store)
    ///
    /// `$XDG_DATA_HOME/mixlite/` (~/.local/share/mixlite/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("mixlite")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/mixlite/` (~/.local/state/mixlite/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("mixlite")
    }

    /// Returns the default store file path
    ///
    /// `$XDG_DATA_HOME/mixlite/queue.db` (~/.local/share/mixlite/queue.db)
    pub fn store_path() -> PathBuf {
        Self::data_dir().join("queue.db")
    }

    /// Store path honoring the `[storage] path` override
    pub fn resolved_store_path(&self) -> PathBuf {
        self.storage.path.clone().unwrap_or_else(Self::store_path)
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/mixlite/mixlite.log` (~/.local/state/mixlite/mixlite.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("mixlite.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
