//! Logging settings, loadable from the `[logging]` table of the server's
//! TOML file

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where log events go and how they are rendered
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level used when `RUST_LOG` is unset
    pub default_level: String,

    /// Extra per-target directives, e.g. `"hyper=warn"`
    pub directives: Vec<String>,

    pub console: ConsoleConfig,

    /// Rolling JSONL files; off unless set
    pub file: Option<FileConfig>,

    pub json: JsonFields,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            directives: Vec::new(),
            console: ConsoleConfig::default(),
            file: None,
            json: JsonFields::default(),
        }
    }
}

impl LogConfig {
    /// Colored pretty console at `debug`
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            console: ConsoleConfig::pretty(),
            ..Default::default()
        }
    }

    /// Files under `log_dir` kept for a month, console off, HTTP client
    /// chatter capped at `warn`
    pub fn production(log_dir: PathBuf) -> Self {
        let mut config = Self {
            directives: vec!["hyper=warn".to_string(), "reqwest=warn".to_string()],
            file: Some(FileConfig {
                directory: log_dir,
                keep: Some(30),
                ..FileConfig::default()
            }),
            ..Default::default()
        };
        config.console.enabled = false;
        config
    }

    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            ..Default::default()
        }
    }

    /// The filter string used when RUST_LOG is unset
    pub fn filter_directives(&self) -> String {
        std::iter::once(self.default_level.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Console rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    /// ANSI colors; only honored by the pretty format
    pub color: bool,
}

impl ConsoleConfig {
    pub fn pretty() -> Self {
        Self {
            enabled: true,
            format: LogFormat::Pretty,
            color: true,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: LogFormat::Json,
            color: false,
        }
    }
}

/// Rolling file output, always JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// Files are named `<prefix>.<date>.jsonl`, or `<prefix>.jsonl` when
    /// rotation is off
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Rotated files to keep; `None` keeps everything
    pub keep: Option<usize>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "dashsync".to_string(),
            rotation: RotationStrategy::Daily,
            keep: Some(7),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// Single file, truncated at startup
    Never,
}

/// Optional context attached to each JSON line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonFields {
    /// Enclosing spans, e.g. the refresh trigger
    pub spans: bool,
    /// Source file and line
    pub source_location: bool,
}

impl Default for JsonFields {
    fn default() -> Self {
        Self {
            spans: true,
            source_location: false,
        }
    }
}
