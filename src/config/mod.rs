//! Configuration management for fishsync

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::client::models::Permission;
use crate::client::registry::{API_BASE_URL, STREAM_URL};
use crate::error::{ConfigError, Result};

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "FISHFISH_API_KEY";

/// Session tokens live for an hour. Renewing every half hour keeps the held
/// token valid for at least one more interval at all times.
pub const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Liveness frame cadence on the change stream
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Default full resync cadence
pub const FULL_SYNC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Stream reconnect backoff bounds
pub const STREAM_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
pub const STREAM_BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Update events for unknown keys tolerated before an early resync
pub const MISSED_UPDATES_BEFORE_RESYNC: u32 = 3;

/// Library configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// FishFish primary API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Permissions requested for session tokens
    #[serde(default)]
    pub permissions: Vec<Permission>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_stream_url")]
    pub stream_url: String,

    /// Sync preferences
    #[serde(default)]
    pub sync: SyncPreferences,
}

/// User-tunable sync preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPreferences {
    /// Seconds between full resyncs
    #[serde(default = "default_full_sync_interval_secs")]
    pub full_sync_interval_secs: u64,

    /// Reconnect the change stream after it drops
    #[serde(default = "default_reconnect_stream")]
    pub reconnect_stream: bool,
}

fn default_api_url() -> String {
    API_BASE_URL.to_string()
}

fn default_stream_url() -> String {
    STREAM_URL.to_string()
}

fn default_full_sync_interval_secs() -> u64 {
    FULL_SYNC_INTERVAL.as_secs()
}

fn default_reconnect_stream() -> bool {
    true
}

impl Default for SyncPreferences {
    fn default() -> Self {
        Self {
            full_sync_interval_secs: default_full_sync_interval_secs(),
            reconnect_stream: default_reconnect_stream(),
        }
    }
}

impl SyncPreferences {
    pub fn full_sync_interval(&self) -> Duration {
        Duration::from_secs(self.full_sync_interval_secs)
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".fishsync").join("config.yaml"))
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path()?)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(&path, contents)?;

        // The file holds the primary API key
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    /// The configured API key, falling back to `FISHFISH_API_KEY`
    pub fn api_key_or_env(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.is_empty())
    }

    /// Validate that an API key is available
    pub fn validate_auth(&self) -> Result<()> {
        if self.api_key_or_env().is_none() {
            return Err(ConfigError::MissingApiKey.into());
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sync.full_sync_interval_secs == 0 {
            return Err(
                ConfigError::Invalid("full_sync_interval_secs must be positive".to_string()).into(),
            );
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            permissions: Vec::new(),
            api_url: default_api_url(),
            stream_url: default_stream_url(),
            sync: SyncPreferences::default(),
        }
    }
}

/// Runtime intervals used by the sync coordinator
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub permissions: Vec<Permission>,
    pub token_refresh_interval: Duration,
    pub keepalive_interval: Duration,
    pub reconnect_stream: bool,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub missed_updates_before_resync: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            permissions: Vec::new(),
            token_refresh_interval: TOKEN_REFRESH_INTERVAL,
            keepalive_interval: KEEPALIVE_INTERVAL,
            reconnect_stream: true,
            backoff_initial: STREAM_BACKOFF_INITIAL,
            backoff_max: STREAM_BACKOFF_MAX,
            missed_updates_before_resync: MISSED_UPDATES_BEFORE_RESYNC,
        }
    }
}

impl SyncSettings {
    /// Reject intervals the background tasks cannot tick on
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("token_refresh_interval", self.token_refresh_interval),
            ("keepalive_interval", self.keepalive_interval),
            ("backoff_initial", self.backoff_initial),
        ];
        for (name, interval) in intervals {
            if interval.is_zero() {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)).into());
            }
        }
        if self.backoff_max < self.backoff_initial {
            return Err(
                ConfigError::Invalid("backoff_max must not be below backoff_initial".to_string())
                    .into(),
            );
        }
        Ok(())
    }
}

impl From<&Config> for SyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            permissions: config.permissions.clone(),
            reconnect_stream: config.sync.reconnect_stream,
            ..Self::default()
        }
    }
}
