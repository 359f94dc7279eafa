//! Configuration for the sync service

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::fetcher::DEFAULT_FETCH_TIMEOUT;
use crate::presence::PresenceConfig;

/// Default refresh interval in minutes
pub const DEFAULT_REFRESH_MINUTES: u64 = 10;

/// Environment variable names
pub mod env {
    pub const DATA_SOURCE_URL: &str = "DATA_SOURCE_URL";
    pub const AUTO_UPDATE_MINUTES: &str = "AUTO_UPDATE_MINUTES";
    pub const DISABLE_STARTUP_CLOUD_CHECK: &str = "DISABLE_STARTUP_CLOUD_CHECK";
    pub const REFRESH_TOKEN: &str = "REFRESH_TOKEN";
    pub const FETCH_TIMEOUT_SECS: &str = "FETCH_TIMEOUT_SECS";
    pub const PRESENCE_EXPIRY_SECS: &str = "PRESENCE_EXPIRY_SECS";
    pub const PRESENCE_REAP_SECS: &str = "PRESENCE_REAP_SECS";
    pub const DATASET_MIRROR_PATH: &str = "DATASET_MIRROR_PATH";
}

/// Configuration for a [`SyncService`](crate::SyncService)
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote dataset URL
    pub source_url: Option<String>,
    /// Time between scheduled refreshes
    pub refresh_interval: Duration,
    /// Run one refresh as soon as the service starts
    pub startup_refresh: bool,
    /// Network timeout of a single fetch
    pub fetch_timeout: Duration,
    /// Shared secret for the forced-refresh webhook
    pub refresh_secret: Option<String>,
    /// Presence registry settings
    pub presence: PresenceConfig,
    /// Optional on-disk copy of the last committed payload
    pub mirror_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_MINUTES * 60),
            startup_refresh: true,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            refresh_secret: None,
            presence: PresenceConfig::default(),
            mirror_path: None,
        }
    }
}

impl SyncConfig {
    /// Create a configuration for the given source
    pub fn with_source(url: impl Into<String>) -> Self {
        Self {
            source_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Override fields from an environment lookup
    ///
    /// Unset or empty variables leave the current value untouched.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(env::DATA_SOURCE_URL) {
            self.source_url = Some(url.trim().to_string());
        }
        if let Some(minutes) = get(env::AUTO_UPDATE_MINUTES) {
            let minutes = parse_positive(env::AUTO_UPDATE_MINUTES, &minutes)?;
            self.refresh_interval = minutes_to_interval(env::AUTO_UPDATE_MINUTES, minutes)?;
        }
        if let Some(flag) = get(env::DISABLE_STARTUP_CLOUD_CHECK) {
            self.startup_refresh = !is_truthy(&flag);
        }
        if let Some(token) = get(env::REFRESH_TOKEN) {
            self.refresh_secret = Some(token);
        }
        if let Some(secs) = get(env::FETCH_TIMEOUT_SECS) {
            self.fetch_timeout =
                Duration::from_secs(parse_positive(env::FETCH_TIMEOUT_SECS, &secs)?);
        }
        if let Some(secs) = get(env::PRESENCE_EXPIRY_SECS) {
            self.presence.expiry =
                Duration::from_secs(parse_positive(env::PRESENCE_EXPIRY_SECS, &secs)?);
        }
        if let Some(secs) = get(env::PRESENCE_REAP_SECS) {
            self.presence.reap_interval =
                Duration::from_secs(parse_positive(env::PRESENCE_REAP_SECS, &secs)?);
        }
        if let Some(path) = get(env::DATASET_MIRROR_PATH) {
            self.mirror_path = Some(PathBuf::from(path));
        }

        Ok(self)
    }

    /// Set the source URL
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Set the refresh interval
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Enable or disable the startup refresh
    pub fn with_startup_refresh(mut self, enabled: bool) -> Self {
        self.startup_refresh = enabled;
        self
    }

    /// Set the fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the webhook secret
    pub fn with_refresh_secret(mut self, secret: impl Into<String>) -> Self {
        self.refresh_secret = Some(secret.into());
        self
    }

    /// Set the presence configuration
    pub fn with_presence(mut self, presence: PresenceConfig) -> Self {
        self.presence = presence;
        self
    }

    /// Mirror committed payloads to `path`
    pub fn with_mirror_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mirror_path = Some(path.into());
        self
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.source_url.as_deref() {
            None => return Err(ConfigError::Missing(env::DATA_SOURCE_URL.to_string())),
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                return Err(ConfigError::InvalidValue {
                    key: env::DATA_SOURCE_URL.to_string(),
                    value: url.to_string(),
                });
            }
            Some(_) => {}
        }
        self.validate_timings()
    }

    /// Reject zero durations; does not require a source, unlike
    /// [`validate`](Self::validate)
    pub fn validate_timings(&self) -> Result<(), ConfigError> {
        let checks = [
            (env::AUTO_UPDATE_MINUTES, self.refresh_interval),
            (env::FETCH_TIMEOUT_SECS, self.fetch_timeout),
            (env::PRESENCE_EXPIRY_SECS, self.presence.expiry),
            (env::PRESENCE_REAP_SECS, self.presence.reap_interval),
        ];
        for (key, duration) in checks {
            if duration.is_zero() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: "0".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Convert a refresh interval in minutes, rejecting overflow
pub fn minutes_to_interval(key: &str, minutes: u64) -> Result<Duration, ConfigError> {
    minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value: minutes.to_string(),
        })
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE")
}

fn parse_positive(key: &str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
