//! Live presence tracking for open dashboard sessions
//!
//! Presence is heartbeat-driven. Clients cannot be relied on to announce
//! that they left (network loss, crashes, back navigation), so every session
//! expires once its last heartbeat is older than the expiry threshold. An
//! explicit disconnect only shortens that window.
//!
//! Identifiers are client-chosen and unauthenticated: the count is the
//! number of distinct live identifiers, not a user count.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Default heartbeat expiry threshold
pub const DEFAULT_PRESENCE_EXPIRY: Duration = Duration::from_secs(90);

/// Default interval between reaping passes
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for the presence registry
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Sessions whose last heartbeat is older than this are expired
    pub expiry: Duration,
    /// How often the reaper removes expired sessions
    pub reap_interval: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            expiry: DEFAULT_PRESENCE_EXPIRY,
            reap_interval: DEFAULT_REAP_INTERVAL,
        }
    }
}

/// One open client session
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub first_seen: Instant,
    pub last_heartbeat: Instant,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self {
            first_seen: now,
            last_heartbeat: now,
        }
    }

    fn is_live(&self, now: Instant, expiry: Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat) <= expiry
    }
}

/// Registry of open sessions keyed by client identifier
pub struct PresenceRegistry {
    sessions: DashMap<String, Session>,
    expiry: Duration,
}

impl PresenceRegistry {
    /// Create a registry with the given expiry threshold
    pub fn new(expiry: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            expiry,
        }
    }

    /// The expiry threshold
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Record a heartbeat, creating the session on first sight
    pub fn heartbeat(&self, id: &str) {
        let now = Instant::now();
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.last_heartbeat = now;
            return;
        }
        self.sessions
            .entry(id.to_owned())
            .and_modify(|s| s.last_heartbeat = now)
            .or_insert_with(|| {
                debug!(session = %id, "New presence session");
                Session::new(now)
            });
    }

    /// Remove a session. Returns false if it was not present.
    pub fn disconnect(&self, id: &str) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(session = %id, "Presence session disconnected");
        }
        removed
    }

    /// Number of sessions that heartbeated within the expiry threshold
    ///
    /// Expired entries are skipped, not removed; see [`PresenceRegistry::reap`].
    pub fn count(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_live(now, self.expiry))
            .count()
    }

    /// Whether a session is currently live
    pub fn is_live(&self, id: &str) -> bool {
        let now = Instant::now();
        self.sessions
            .get(id)
            .is_some_and(|s| s.is_live(now, self.expiry))
    }

    /// Remove every expired session, returning how many were removed
    pub fn reap(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.is_live(now, self.expiry));
        before.saturating_sub(self.sessions.len())
    }

    /// Number of tracked entries, expired ones included
    pub fn tracked(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PRESENCE_EXPIRY)
    }
}

/// Background task that periodically reaps expired sessions
pub struct PresenceReaper;

impl PresenceReaper {
    /// Spawn the reaper as a background task
    pub fn spawn(
        registry: Arc<PresenceRegistry>,
        interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Presence reaper started");

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Presence reaper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = registry.reap();
                        if removed > 0 {
                            debug!(removed, online = registry.count(), "Reaped expired sessions");
                        }
                    }
                }
            }
        })
    }
}
