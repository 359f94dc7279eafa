//! # Dashsync Core
//!
//! Keeps the dashboard's dataset fresh and tracks how many clients currently
//! have the dashboard open.
//!
//! This crate provides [`SyncService`], which ties together:
//! - [`ContentFetcher`]: conditional retrieval of the remote dataset
//! - [`Fingerprint`]: content hashing as the ground truth for change
//! - [`DatasetCache`]: atomic snapshot replacement with lock-free reads
//! - [`RefreshCoordinator`]: one refresh at a time, stale-on-failure
//! - [`RefreshScheduler`]: periodic and startup refreshes
//! - [`WebhookGate`]: shared-secret forced refresh
//! - [`PresenceRegistry`]: heartbeat-driven session counting
//!
//! ## Example
//!
//! ```rust,ignore
//! use dashsync_core::{RawDatasetParser, SyncConfig, SyncService};
//!
//! let config = SyncConfig::from_env()?;
//! let service = SyncService::from_config(config, RawDatasetParser)?;
//! service.start().await?;
//!
//! // Presentation layer
//! match service.cache().read() {
//!     Some(snapshot) => render(snapshot.dataset(), snapshot.fetched_at()),
//!     None => render_placeholder(),
//! }
//! service.presence().heartbeat("tab-3f9c");
//! let online = service.presence().count();
//! ```

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod fingerprint;
pub mod mirror;
pub mod mock_fetcher;
pub mod parser;
pub mod presence;
pub mod scheduler;
pub mod service;
pub mod snapshot;
pub mod webhook;

pub use cache::DatasetCache;
pub use config::SyncConfig;
pub use coordinator::{
    RefreshCoordinator, RefreshMode, RefreshOutcome, RefreshState, RefreshTrigger,
};
pub use error::{AuthError, ConfigError, FetchError, MirrorError, ParseError, SyncError, SyncResult};
pub use fetcher::{ContentFetcher, FetchResult, HttpFetcher};
pub use fingerprint::{Fingerprint, fingerprint, has_changed};
pub use mirror::DatasetMirror;
pub use mock_fetcher::MockFetcher;
pub use parser::{DatasetParser, RawDataset, RawDatasetParser};
pub use presence::{PresenceConfig, PresenceReaper, PresenceRegistry};
pub use scheduler::RefreshScheduler;
pub use service::SyncService;
pub use snapshot::{DatasetSnapshot, SnapshotInfo, Validators};
pub use webhook::{WebhookGate, WebhookReceipt};
