//! Structured logging for dashsync
//!
//! Console output is JSONL by default so the server's logs can be shipped
//! as-is; [`LogConfig::development`] switches to pretty output. Optional file
//! output rotates through `tracing-appender` and is always JSONL.
//!
//! ```ignore
//! use dashsync_logging::{DashsyncSubscriberBuilder, LogConfig};
//!
//! let _guard = DashsyncSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```
//!
//! `RUST_LOG` always wins over the configured level.

pub mod config;

pub use config::{ConsoleConfig, FileConfig, JsonFields, LogConfig, LogFormat, RotationStrategy};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter {directives:?}: {reason}")]
    Filter { directives: String, reason: String },

    #[error("Failed to open log file: {0}")]
    File(#[from] std::io::Error),

    #[error("Failed to create rolling appender: {0}")]
    Appender(String),

    #[error("A global subscriber is already installed")]
    AlreadyInstalled,
}

/// Keeps the non-blocking file writer flushing; hold it until exit
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    file: Option<WorkerGuard>,
}

impl LogGuard {
    /// True if file output is active
    pub fn has_file_output(&self) -> bool {
        self.file.is_some()
    }
}

/// Builder for the dashsync tracing subscriber
pub struct DashsyncSubscriberBuilder {
    config: LogConfig,
}

impl DashsyncSubscriberBuilder {
    /// Defaults: JSONL to console at `info`
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Switch console output between pretty and JSONL
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        if pretty {
            self.config.console = ConsoleConfig::pretty();
        } else {
            self.config.console.format = LogFormat::Json;
            self.config.console.color = false;
        }
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber globally
    pub fn init(self) -> Result<LogGuard, LoggingError> {
        let filter = self.env_filter()?;
        let (layers, guard) = self.build_layers()?;

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|_| LoggingError::AlreadyInstalled)?;

        Ok(LogGuard { file: guard })
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let directives = self.config.filter_directives();
        EnvFilter::try_new(&directives).map_err(|e| LoggingError::Filter {
            directives,
            reason: e.to_string(),
        })
    }

    fn build_layers(&self) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>), LoggingError> {
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if self.config.console.enabled {
            let layer = match self.config.console.format {
                LogFormat::Pretty => tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_ansi(self.config.console.color)
                    .with_target(true)
                    .boxed(),
                LogFormat::Json => self.jsonl_layer(std::io::stdout),
            };
            layers.push(layer);
        }

        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(self.jsonl_layer(writer));
            guard = Some(file_guard);
        }

        Ok((layers, guard))
    }

    fn jsonl_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
    {
        let fields = &self.config.json;
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(fields.spans)
            .with_span_list(fields.spans)
            .with_file(fields.source_location)
            .with_line_number(fields.source_location)
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    }
}

impl Default for DashsyncSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(&config.directory)?;

    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let path = config.directory.join(format!("{}.jsonl", config.prefix));
            return Ok(tracing_appender::non_blocking(File::create(path)?));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("jsonl");
    if let Some(keep) = config.keep {
        builder = builder.max_log_files(keep);
    }
    let appender = builder
        .build(&config.directory)
        .map_err(|e| LoggingError::Appender(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// JSONL to console at `info`
pub fn init_default() -> Result<LogGuard, LoggingError> {
    DashsyncSubscriberBuilder::new().init()
}

/// Pretty console at `debug`
pub fn init_development() -> Result<LogGuard, LoggingError> {
    DashsyncSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Minimal output; ignores an already-installed subscriber
pub fn init_testing() {
    let _ = DashsyncSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}
