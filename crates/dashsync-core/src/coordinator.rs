//! Refresh orchestration
//!
//! One refresh runs the fetcher, checks the payload fingerprint against the
//! cached snapshot, parses, and commits. At most one refresh is in flight;
//! a trigger arriving while one runs is dropped rather than queued. A failed
//! refresh never touches the cache, so readers keep the last good snapshot.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cache::DatasetCache;
use crate::error::SyncResult;
use crate::fetcher::{ContentFetcher, FetchResult};
use crate::fingerprint::{fingerprint, has_changed};
use crate::mirror::DatasetMirror;
use crate::parser::DatasetParser;
use crate::snapshot::{DatasetSnapshot, Validators};

/// How a refresh was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Conditional request using the cached snapshot's validators
    Scheduled,
    /// Unconditional request; the fingerprint still decides whether to commit
    Forced,
}

/// Terminal result of one refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot was committed with this version
    Committed { version: u64 },
    /// Nothing changed, or another refresh was already in flight
    Unchanged,
    /// The refresh failed; the previous snapshot stays authoritative
    Failed(String),
}

impl RefreshOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, RefreshOutcome::Committed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RefreshOutcome::Failed(_))
    }
}

impl fmt::Display for RefreshOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshOutcome::Committed { version } => write!(f, "committed v{}", version),
            RefreshOutcome::Unchanged => f.write_str("unchanged"),
            RefreshOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Process-wide refresh bookkeeping
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshState {
    pub in_progress: bool,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_outcome: Option<String>,
    pub consecutive_failures: u32,
}

/// Anything that can run a refresh on demand
///
/// The scheduler and the webhook gate only need this, which keeps them
/// independent of the dataset type.
#[async_trait]
pub trait RefreshTrigger: Send + Sync {
    async fn trigger(&self, mode: RefreshMode) -> RefreshOutcome;
}

/// Clears the in-flight flag on every exit path
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Orchestrates fetch, change detection, parse, and commit
pub struct RefreshCoordinator<P: DatasetParser> {
    fetcher: Arc<dyn ContentFetcher>,
    parser: P,
    cache: Arc<DatasetCache<P::Dataset>>,
    mirror: Option<DatasetMirror>,
    in_progress: AtomicBool,
    state: Mutex<RefreshState>,
}

impl<P: DatasetParser> RefreshCoordinator<P> {
    /// Create a coordinator writing into `cache`
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        parser: P,
        cache: Arc<DatasetCache<P::Dataset>>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            cache,
            mirror: None,
            in_progress: AtomicBool::new(false),
            state: Mutex::new(RefreshState::default()),
        }
    }

    /// Mirror every committed payload to disk
    pub fn with_mirror(mut self, mirror: DatasetMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// The cache this coordinator commits into
    pub fn cache(&self) -> &Arc<DatasetCache<P::Dataset>> {
        &self.cache
    }

    /// Snapshot of the refresh bookkeeping
    pub fn status(&self) -> RefreshState {
        let mut state = self.state.lock().clone();
        state.in_progress = self.in_progress.load(Ordering::Acquire);
        state
    }

    /// True while a refresh is running
    pub fn is_refreshing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Run a scheduled (conditional) refresh
    pub async fn refresh_now(&self) -> RefreshOutcome {
        self.refresh_with(RefreshMode::Scheduled).await
    }

    /// Run a refresh in the given mode
    ///
    /// Returns `Unchanged` immediately if another refresh is in flight.
    #[instrument(skip(self))]
    pub async fn refresh_with(&self, mode: RefreshMode) -> RefreshOutcome {
        let Some(_in_flight) = self.try_begin() else {
            debug!("Refresh already in flight, dropping trigger");
            return RefreshOutcome::Unchanged;
        };

        self.state.lock().last_attempt = Some(Utc::now());

        let outcome = match self.run(mode).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Refresh failed, keeping previous snapshot");
                RefreshOutcome::Failed(e.to_string())
            }
        };

        self.record(&outcome);
        outcome
    }

    /// Seed an empty cache from the mirror, if one is configured and present
    ///
    /// Returns the committed version, or `None` if nothing was seeded. A
    /// refresh in flight wins over the mirror.
    pub async fn seed_from_mirror(&self) -> SyncResult<Option<u64>> {
        let Some(mirror) = &self.mirror else {
            return Ok(None);
        };
        let Some(_in_flight) = self.try_begin() else {
            debug!("Refresh in flight, skipping mirror seed");
            return Ok(None);
        };
        if !self.cache.is_empty() {
            return Ok(None);
        }
        let Some(mirrored) = mirror.load().await? else {
            return Ok(None);
        };

        let dataset = self.parser.parse(&mirrored.bytes)?;
        let snapshot = DatasetSnapshot::new(
            dataset,
            fingerprint(&mirrored.bytes),
            Validators::default(),
            mirrored.modified_at,
            mirrored.bytes.len(),
        );
        let published = self.cache.commit(snapshot);

        info!(
            path = %mirror.path().display(),
            version = published.version(),
            fetched_at = %published.fetched_at(),
            "Seeded dataset from mirror"
        );
        Ok(Some(published.version()))
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_progress))
    }

    async fn run(&self, mode: RefreshMode) -> SyncResult<RefreshOutcome> {
        let current = self.cache.read();
        let previous = match mode {
            RefreshMode::Scheduled => current.as_deref().map(|s| s.validators()),
            RefreshMode::Forced => None,
        };

        let (payload, validators) = match self.fetcher.fetch(previous).await? {
            FetchResult::NotModified => {
                debug!("Source reports not modified");
                return Ok(RefreshOutcome::Unchanged);
            }
            FetchResult::Modified {
                payload,
                validators,
            } => (payload, validators),
        };

        let new_fingerprint = fingerprint(&payload);
        if !has_changed(&new_fingerprint, current.as_deref().map(|s| s.fingerprint())) {
            debug!(
                fingerprint = %new_fingerprint.short(),
                "Payload identical to cached snapshot"
            );
            return Ok(RefreshOutcome::Unchanged);
        }

        let dataset = self.parser.parse(&payload)?;
        let snapshot = DatasetSnapshot::new(
            dataset,
            new_fingerprint,
            validators,
            Utc::now(),
            payload.len(),
        );
        let published = self.cache.commit(snapshot);
        self.mirror_payload(&payload).await;

        info!(
            version = published.version(),
            fingerprint = %new_fingerprint.short(),
            bytes = payload.len(),
            "Dataset refreshed"
        );
        Ok(RefreshOutcome::Committed {
            version: published.version(),
        })
    }

    async fn mirror_payload(&self, payload: &Bytes) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.store(payload).await {
                warn!(path = %mirror.path().display(), error = %e, "Failed to mirror dataset");
            }
        }
    }

    fn record(&self, outcome: &RefreshOutcome) {
        let mut state = self.state.lock();
        state.last_outcome = Some(outcome.to_string());
        match outcome {
            RefreshOutcome::Committed { .. } => {
                state.last_success = state.last_attempt;
                state.last_error = None;
                state.consecutive_failures = 0;
            }
            RefreshOutcome::Unchanged => {
                state.last_error = None;
                state.consecutive_failures = 0;
            }
            RefreshOutcome::Failed(reason) => {
                state.last_error = Some(reason.clone());
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            }
        }
    }
}

#[async_trait]
impl<P: DatasetParser> RefreshTrigger for RefreshCoordinator<P> {
    async fn trigger(&self, mode: RefreshMode) -> RefreshOutcome {
        self.refresh_with(mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, ParseError};
    use crate::mock_fetcher::MockFetcher;
    use crate::parser::{RawDataset, RawDatasetParser};

    struct RejectingParser;

    impl DatasetParser for RejectingParser {
        type Dataset = RawDataset;

        fn parse(&self, _payload: &Bytes) -> Result<RawDataset, ParseError> {
            Err(ParseError::Rejected("missing column 'Match ID'".into()))
        }
    }

    fn make_coordinator(
        fetcher: Arc<MockFetcher>,
    ) -> RefreshCoordinator<RawDatasetParser> {
        RefreshCoordinator::new(fetcher, RawDatasetParser, Arc::new(DatasetCache::new()))
    }

    #[tokio::test]
    async fn test_first_refresh_commits() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_payload(&b"Match ID\n1\n"[..], Validators::with_etag("\"v1\""));
        let coordinator = make_coordinator(fetcher.clone());

        let outcome = coordinator.refresh_now().await;
        assert_eq!(outcome, RefreshOutcome::Committed { version: 1 });
        assert_eq!(fetcher.seen_validators(), vec![None]);

        let status = coordinator.status();
        assert!(status.last_success.is_some());
        assert!(status.last_error.is_none());
        assert!(!status.in_progress);
    }

    #[tokio::test]
    async fn test_scheduled_refresh_sends_cached_validators() {
        let fetcher = Arc::new(MockFetcher::new());
        let validators = Validators::with_etag("\"v1\"").and_last_modified("Tue, 02 Jan 2024 10:00:00 GMT");
        fetcher.push_payload(&b"Match ID\n1\n"[..], validators.clone());
        fetcher.push_not_modified();
        let coordinator = make_coordinator(fetcher.clone());

        coordinator.refresh_now().await;
        assert_eq!(coordinator.refresh_now().await, RefreshOutcome::Unchanged);
        assert_eq!(fetcher.seen_validators(), vec![None, Some(validators)]);
    }

    #[tokio::test]
    async fn test_forced_refresh_is_unconditional() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_payload(&b"Match ID\n1\n"[..], Validators::with_etag("\"v1\""));
        fetcher.push_payload(&b"Match ID\n1\n"[..], Validators::with_etag("\"v1\""));
        let coordinator = make_coordinator(fetcher.clone());

        coordinator.refresh_now().await;
        let outcome = coordinator.refresh_with(RefreshMode::Forced).await;

        // Same bytes: the fingerprint still blocks the commit
        assert_eq!(outcome, RefreshOutcome::Unchanged);
        assert_eq!(fetcher.seen_validators(), vec![None, None]);
        assert_eq!(coordinator.cache().version(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_records_error() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_error(FetchError::Status {
            status: 500,
            url: "https://example.com".into(),
        });
        let coordinator = make_coordinator(fetcher);

        let outcome = coordinator.refresh_now().await;
        assert!(outcome.is_failed());

        let status = coordinator.status();
        assert!(status.last_error.unwrap().contains("HTTP 500"));
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_attempt.is_some());
        assert!(status.last_success.is_none());
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_parse_failure_keeps_previous_snapshot() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_payload(&b"garbage"[..], Validators::default());
        let cache = Arc::new(DatasetCache::new());
        let coordinator = RefreshCoordinator::new(fetcher, RejectingParser, cache.clone());

        let outcome = coordinator.refresh_now().await;
        assert!(matches!(outcome, RefreshOutcome::Failed(ref r) if r.contains("Match ID")));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_success_clears_failure_streak() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_error(FetchError::Timeout("20s".into()));
        fetcher.push_error(FetchError::Timeout("20s".into()));
        fetcher.push_payload(&b"Match ID\n1\n"[..], Validators::default());
        let coordinator = make_coordinator(fetcher);

        coordinator.refresh_now().await;
        coordinator.refresh_now().await;
        assert_eq!(coordinator.status().consecutive_failures, 2);

        assert!(coordinator.refresh_now().await.is_committed());
        let status = coordinator.status();
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_seed_from_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = DatasetMirror::new(dir.path().join("dataset.csv"));
        mirror.store(b"Match ID\n7\n").await.unwrap();

        let coordinator =
            make_coordinator(Arc::new(MockFetcher::new())).with_mirror(mirror.clone());
        assert_eq!(coordinator.seed_from_mirror().await.unwrap(), Some(1));

        let snapshot = coordinator.cache().read().unwrap();
        assert_eq!(&snapshot.dataset().bytes()[..], b"Match ID\n7\n");
        assert!(snapshot.validators().is_empty());

        // A populated cache is never reseeded
        assert_eq!(coordinator.seed_from_mirror().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_seed_skipped_while_refresh_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = DatasetMirror::new(dir.path().join("dataset.csv"));
        mirror.store(b"Match ID\n7\n").await.unwrap();

        let fetcher = Arc::new(MockFetcher::held());
        fetcher.push_payload(&b"Match ID\n8\n7\n"[..], Validators::with_etag("\"v8\""));
        let coordinator = Arc::new(make_coordinator(fetcher.clone()).with_mirror(mirror));

        let refresh = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.refresh_now().await })
        };
        fetcher.wait_entered().await;

        assert_eq!(coordinator.seed_from_mirror().await.unwrap(), None);
        assert!(coordinator.cache().is_empty());

        fetcher.release();
        assert!(refresh.await.unwrap().is_committed());
        let snapshot = coordinator.cache().read().unwrap();
        assert_eq!(&snapshot.dataset().bytes()[..], b"Match ID\n8\n7\n");
        assert_eq!(snapshot.version(), 1);
    }

    #[tokio::test]
    async fn test_commit_writes_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = DatasetMirror::new(dir.path().join("dataset.csv"));
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.push_payload(&b"Match ID\n9\n"[..], Validators::default());

        let coordinator = make_coordinator(fetcher).with_mirror(mirror.clone());
        coordinator.refresh_now().await;

        let mirrored = mirror.load().await.unwrap().unwrap();
        assert_eq!(&mirrored.bytes[..], b"Match ID\n9\n");
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(RefreshOutcome::Committed { version: 3 }.to_string(), "committed v3");
        assert_eq!(RefreshOutcome::Unchanged.to_string(), "unchanged");
        assert_eq!(
            RefreshOutcome::Failed("boom".into()).to_string(),
            "failed: boom"
        );
    }
}
