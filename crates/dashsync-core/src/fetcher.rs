//! Conditional retrieval of the remote dataset
//!
//! The [`ContentFetcher`] trait lets the refresh coordinator work with the
//! real HTTP source and with in-memory fetchers in tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{ETAG, HeaderMap, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use tracing::{debug, trace, warn};

use crate::error::FetchError;
use crate::snapshot::Validators;

/// Default network timeout for a single fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

const USER_AGENT: &str = concat!("dashsync/", env!("CARGO_PKG_VERSION"));

/// Result of one fetch
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// The source confirmed nothing changed since the given validators
    NotModified,
    /// The source sent a payload
    Modified {
        payload: Bytes,
        validators: Validators,
    },
}

impl FetchResult {
    /// True for a "not modified" answer
    pub fn is_not_modified(&self) -> bool {
        matches!(self, FetchResult::NotModified)
    }
}

/// Retrieves the remote dataset
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch the dataset
    ///
    /// `previous` validators, when present, are sent as preconditions. With
    /// `None` the request is unconditional (first fetch or forced refresh).
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on transport failure, timeout, or any status
    /// other than success or "not modified".
    async fn fetch(&self, previous: Option<&Validators>) -> Result<FetchResult, FetchError>;
}

/// HTTP fetcher backed by reqwest
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    /// Create a fetcher for `url` with the default timeout
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_timeout(url, DEFAULT_FETCH_TIMEOUT)
    }

    /// Create a fetcher for `url` with a custom timeout
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// The source URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, previous: Option<&Validators>) -> Result<FetchResult, FetchError> {
        let mut request = self.client.get(&self.url);
        if let Some(prev) = previous {
            if let Some(etag) = &prev.etag {
                request = request.header(IF_NONE_MATCH, etag.as_str());
            }
            if let Some(last_modified) = &prev.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
            }
        }

        trace!(url = %self.url, conditional = previous.is_some(), "HTTP GET starting");

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(
                    url = %self.url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "Dataset request failed"
                );
                return Err(e.into());
            }
        };

        let status = response.status();
        debug!(url = %self.url, status = status.as_u16(), "Dataset response received");

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchResult::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let validators = Validators {
            etag: header_string(response.headers(), ETAG),
            last_modified: header_string(response.headers(), LAST_MODIFIED),
        }
        .or_previous(previous);

        let payload = response
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        trace!(url = %self.url, bytes = payload.len(), "Dataset body read");

        Ok(FetchResult::Modified {
            payload,
            validators,
        })
    }
}
