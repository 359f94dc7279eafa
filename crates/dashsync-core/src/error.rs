//! Error types for the dashsync core

use thiserror::Error;

/// Top-level error type for the sync engine
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Mirror error: {0}")]
    Mirror(#[from] MirrorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Service already started")]
    AlreadyStarted,
}

/// Errors raised while retrieving the remote dataset
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Errors raised by a dataset parser rejecting a payload
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Payload is empty")]
    Empty,

    #[error("Payload rejected: {0}")]
    Rejected(String),
}

/// Errors raised by the webhook gate
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("No refresh secret configured")]
    SecretNotConfigured,

    #[error("No refresh token provided")]
    MissingToken,

    #[error("Refresh token mismatch")]
    TokenMismatch,
}

/// Errors raised by the on-disk dataset mirror
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Mirror I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MirrorError {
    fn from(e: std::io::Error) -> Self {
        MirrorError::Io(e.to_string())
    }
}

/// Errors raised while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required setting: {0}")]
    Missing(String),
}

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = FetchError::Status {
            status: 503,
            url: "https://example.com/data.csv".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503 from https://example.com/data.csv");
    }

    #[test]
    fn test_sync_error_from_parse() {
        let err: SyncError = ParseError::Empty.into();
        assert!(err.to_string().contains("Parse error"));
    }
}
