//! Scripted in-memory fetcher for testing
//!
//! Answers each call with the next queued response and records the
//! validators it was given. Once the queue is drained every call answers
//! "not modified".
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dashsync_core::{MockFetcher, Validators};
//!
//! let fetcher = MockFetcher::new();
//! fetcher.push_payload(b"Match ID\n1\n", Validators::with_etag("\"v1\""));
//! fetcher.push_not_modified();
//! ```
//!
//! A held fetcher parks every call until [`MockFetcher::release`] is called,
//! which makes an in-flight refresh observable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use crate::error::FetchError;
use crate::fetcher::{ContentFetcher, FetchResult};
use crate::snapshot::Validators;

struct Hold {
    entered: Notify,
    release: Semaphore,
}

/// A fetcher driven by a queue of scripted responses
#[derive(Default)]
pub struct MockFetcher {
    responses: Mutex<VecDeque<Result<FetchResult, FetchError>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Option<Validators>>>,
    hold: Option<Hold>,
}

impl MockFetcher {
    /// Create a fetcher that answers immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fetcher whose calls wait for [`MockFetcher::release`]
    pub fn held() -> Self {
        Self {
            hold: Some(Hold {
                entered: Notify::new(),
                release: Semaphore::new(0),
            }),
            ..Self::default()
        }
    }

    /// Queue a payload response
    pub fn push_payload(&self, payload: impl Into<Bytes>, validators: Validators) {
        self.responses.lock().push_back(Ok(FetchResult::Modified {
            payload: payload.into(),
            validators,
        }));
    }

    /// Queue a "not modified" response
    pub fn push_not_modified(&self) {
        self.responses.lock().push_back(Ok(FetchResult::NotModified));
    }

    /// Queue a failure
    pub fn push_error(&self, error: FetchError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Number of fetch calls started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Validators passed to each call, in order
    pub fn seen_validators(&self) -> Vec<Option<Validators>> {
        self.seen.lock().clone()
    }

    /// Wait until a held call has started
    pub async fn wait_entered(&self) {
        if let Some(hold) = &self.hold {
            hold.entered.notified().await;
        }
    }

    /// Let one held call complete
    pub fn release(&self) {
        if let Some(hold) = &self.hold {
            hold.release.add_permits(1);
        }
    }
}

#[async_trait]
impl ContentFetcher for MockFetcher {
    async fn fetch(&self, previous: Option<&Validators>) -> Result<FetchResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(previous.cloned());

        if let Some(hold) = &self.hold {
            hold.entered.notify_one();
            let permit = hold
                .release
                .acquire()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            permit.forget();
        }

        self.responses
            .lock()
            .pop_front()
            .unwrap_or(Ok(FetchResult::NotModified))
    }
}
