//! Wires the cache, coordinator, scheduler, webhook gate, and presence
//! registry into one explicitly owned service object.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::DatasetCache;
use crate::config::{SyncConfig, env};
use crate::coordinator::{RefreshCoordinator, RefreshState};
use crate::error::{ConfigError, SyncError, SyncResult};
use crate::fetcher::{ContentFetcher, HttpFetcher};
use crate::mirror::DatasetMirror;
use crate::parser::DatasetParser;
use crate::presence::{PresenceReaper, PresenceRegistry};
use crate::scheduler::RefreshScheduler;
use crate::webhook::WebhookGate;

/// The dataset sync engine plus live presence tracking
pub struct SyncService<P: DatasetParser + 'static> {
    config: SyncConfig,
    cache: Arc<DatasetCache<P::Dataset>>,
    coordinator: Arc<RefreshCoordinator<P>>,
    presence: Arc<PresenceRegistry>,
    gate: WebhookGate,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl<P: DatasetParser + 'static> SyncService<P> {
    /// Create a service around an existing fetcher
    pub fn new(config: SyncConfig, fetcher: Arc<dyn ContentFetcher>, parser: P) -> Self {
        let cache = Arc::new(DatasetCache::new());

        let mut coordinator = RefreshCoordinator::new(fetcher, parser, Arc::clone(&cache));
        if let Some(path) = &config.mirror_path {
            coordinator = coordinator.with_mirror(DatasetMirror::new(path));
        }
        let coordinator = Arc::new(coordinator);

        let gate = WebhookGate::new(config.refresh_secret.as_deref(), coordinator.clone());
        let presence = Arc::new(PresenceRegistry::new(config.presence.expiry));
        let (shutdown_tx, _) = broadcast::channel(4);

        Self {
            config,
            cache,
            coordinator,
            presence,
            gate,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Create a service fetching over HTTP from the configured source
    pub fn from_config(config: SyncConfig, parser: P) -> SyncResult<Self> {
        config.validate()?;
        let url = config
            .source_url
            .clone()
            .ok_or_else(|| ConfigError::Missing(env::DATA_SOURCE_URL.to_string()))?;
        let fetcher = HttpFetcher::with_timeout(url, config.fetch_timeout)?;
        Ok(Self::new(config, Arc::new(fetcher), parser))
    }

    /// Seed from the mirror and start the scheduler and presence reaper
    ///
    /// Returns once the background tasks are spawned; the startup refresh
    /// runs on the scheduler task.
    pub async fn start(&self) -> SyncResult<()> {
        self.config.validate_timings()?;
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SyncError::AlreadyStarted);
        }

        if let Err(e) = self.coordinator.seed_from_mirror().await {
            warn!(error = %e, "Could not seed dataset from mirror");
        }

        let scheduler = RefreshScheduler::spawn(
            self.coordinator.clone(),
            self.config.refresh_interval,
            self.config.startup_refresh,
            self.shutdown_tx.subscribe(),
        );
        let reaper = PresenceReaper::spawn(
            self.presence.clone(),
            self.config.presence.reap_interval,
            self.shutdown_tx.subscribe(),
        );
        self.tasks.lock().extend([scheduler, reaper]);

        info!(
            refresh_interval_secs = self.config.refresh_interval.as_secs(),
            startup_refresh = self.config.startup_refresh,
            webhook_enabled = self.gate.is_enabled(),
            "Sync service started"
        );
        Ok(())
    }

    /// Signal background tasks to stop and wait for them
    ///
    /// A refresh already in flight completes before the scheduler exits.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Sync service stopped");
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<DatasetCache<P::Dataset>> {
        &self.cache
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator<P>> {
        &self.coordinator
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    pub fn gate(&self) -> &WebhookGate {
        &self.gate
    }

    /// Current refresh bookkeeping
    pub fn refresh_status(&self) -> RefreshState {
        self.coordinator.status()
    }
}
