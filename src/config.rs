//! Configuration for the server watcher.
//!
//! Layered the usual way:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides (applied by the caller)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SW_` and use double underscores
//! to separate nested levels:
//! - `SW_POLL__INTERVAL_SECONDS=30` sets `poll.interval_seconds`
//! - `SW_REGISTRY__BACKEND_URL=http://localhost:8080` sets `registry.backend_url`
//! - `SW_NOTIFY__WEBHOOK_URL=https://...` sets `notify.webhook_url`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Smallest poll interval operators may configure.
pub const MIN_INTERVAL_SECS: u64 = 5;

const APP_DIR: &str = "serverwatch";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Configuration file already exists at {0}. Use --force to overwrite")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Where the last known server set is persisted
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Registry connection settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Poll cadence
    #[serde(default)]
    pub poll: PollConfig,

    /// Name allow-list
    #[serde(default)]
    pub watch: WatchConfig,

    /// Where notifications go
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Base URL of the registry; the list lives at `{backend_url}/servers`
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Upper bound on a single fetch, in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PollConfig {
    /// Seconds between poll cycles (minimum 5)
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct WatchConfig {
    /// Server names to track. Empty tracks everything.
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NotifyConfig {
    /// Webhook receiving UP/DOWN messages. Unset logs events instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    /// Upper bound on a single webhook delivery, in seconds
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `serverwatch::registry = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_state_path() -> PathBuf {
    app_dir().join("watcher_state.json")
}
fn default_backend_url() -> String {
    "https://jacinto-server.fly.dev".to_string()
}
fn default_fetch_timeout() -> u64 {
    5
}
fn default_interval() -> u64 {
    15
}
fn default_webhook_timeout() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Per-user configuration directory, e.g. `~/.config/serverwatch`.
fn app_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!(".{APP_DIR}")))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            state_path: default_state_path(),
            registry: RegistryConfig::default(),
            poll: PollConfig::default(),
            watch: WatchConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_timeout_secs: default_webhook_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl PollConfig {
    /// Reject intervals below [`MIN_INTERVAL_SECS`].
    pub fn validate_interval(seconds: u64) -> Result<u64, ConfigError> {
        if seconds < MIN_INTERVAL_SECS {
            return Err(ConfigError::Invalid {
                field: "poll.interval_seconds",
                reason: format!("{seconds}s is below the minimum of {MIN_INTERVAL_SECS}s"),
            });
        }
        Ok(seconds)
    }
}

impl Settings {
    /// Default location of the settings file.
    pub fn default_config_path() -> PathBuf {
        app_dir().join("settings.toml")
    }

    /// Load configuration from all sources.
    ///
    /// Uses `path` when given, otherwise [`Settings::default_config_path`].
    /// A missing file is fine; defaults and env vars still apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, then environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings: Settings = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores stay
            .merge(
                Env::prefixed("SW_")
                    .map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
            .map_err(Box::new)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check values that serde can't.
    pub fn validate(&self) -> Result<(), ConfigError> {
        PollConfig::validate_interval(self.poll.interval_seconds)?;

        if self.registry.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "registry.fetch_timeout_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }

        if self.registry.backend_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "registry.backend_url",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Webhook URL if one is configured and non-blank.
    pub fn webhook_url(&self) -> Option<&str> {
        self.notify
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file at `path`.
    pub fn init_config_file(path: &Path, force: bool) -> Result<PathBuf, ConfigError> {
        if !force && path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }

        Settings::default().save(path)?;
        Ok(path.to_path_buf())
    }
}
