//! Server configuration
//!
//! Settings are layered: built-in defaults, then the optional TOML file,
//! then environment variables, then command-line flags.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use dashsync_core::SyncConfig;
use dashsync_core::config::minutes_to_interval;
use dashsync_core::error::ConfigError;
use dashsync_logging::{ConsoleConfig, LogConfig};
use serde::Deserialize;
use thiserror::Error;

/// Default listen address
pub const DEFAULT_LISTEN: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8050);

#[derive(Debug, Parser)]
#[command(
    name = "dashsync-server",
    about = "Serves the dashboard dataset and live presence count",
    version
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "DASHSYNC_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Remote dataset URL
    #[arg(long)]
    pub source_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Human-readable console logs instead of JSONL
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Sync(#[from] ConfigError),
}

/// Contents of the TOML configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub listen: Option<SocketAddr>,
    pub sync: SyncSection,
    pub presence: PresenceSection,
    pub logging: Option<LogConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    pub source_url: Option<String>,
    pub auto_update_minutes: Option<u64>,
    pub startup_refresh: Option<bool>,
    pub refresh_token: Option<String>,
    pub fetch_timeout_secs: Option<u64>,
    pub mirror_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PresenceSection {
    pub expiry_secs: Option<u64>,
    pub reap_secs: Option<u64>,
}

impl FileSettings {
    pub fn read(path: &Path) -> Result<Self, ServerConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ServerConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults overridden by the file's values
    fn sync_config(&self) -> Result<SyncConfig, ConfigError> {
        let mut config = SyncConfig::default();
        let sync = &self.sync;

        if let Some(url) = &sync.source_url {
            config.source_url = Some(url.clone());
        }
        if let Some(minutes) = sync.auto_update_minutes {
            config.refresh_interval = minutes_to_interval("sync.auto_update_minutes", minutes)?;
        }
        if let Some(enabled) = sync.startup_refresh {
            config.startup_refresh = enabled;
        }
        if let Some(token) = &sync.refresh_token {
            config.refresh_secret = Some(token.clone());
        }
        if let Some(secs) = sync.fetch_timeout_secs {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = &sync.mirror_path {
            config.mirror_path = Some(path.clone());
        }
        if let Some(secs) = self.presence.expiry_secs {
            config.presence.expiry = Duration::from_secs(secs);
        }
        if let Some(secs) = self.presence.reap_secs {
            config.presence.reap_interval = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// Fully resolved server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub sync: SyncConfig,
    pub logging: LogConfig,
}

impl ServerConfig {
    /// Resolve settings from the CLI, an environment lookup, and the
    /// configuration file named by the CLI
    pub fn load<F>(cli: &Cli, lookup: F) -> Result<Self, ServerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match &cli.config {
            Some(path) => FileSettings::read(path)?,
            None => FileSettings::default(),
        };

        let mut sync = file.sync_config()?.apply_env(lookup)?;
        if let Some(url) = &cli.source_url {
            sync.source_url = Some(url.clone());
        }
        sync.validate_timings()?;

        let mut logging = file.logging.unwrap_or_default();
        if let Some(level) = &cli.log_level {
            logging.default_level = level.clone();
        }
        if cli.pretty {
            logging.console = ConsoleConfig::pretty();
        }

        Ok(Self {
            listen: cli.listen.or(file.listen).unwrap_or(DEFAULT_LISTEN),
            sync,
            logging,
        })
    }
}
