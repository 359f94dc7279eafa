//! Background task driving periodic refreshes
//!
//! Handles:
//! - One refresh at startup (unless disabled) so the dashboard is not empty
//!   until the first interval elapses
//! - A refresh on every interval tick
//! - Shutdown via a broadcast signal
//!
//! A refresh that is already running when shutdown arrives is allowed to
//! finish; the signal is only observed between ticks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::coordinator::{RefreshMode, RefreshOutcome, RefreshTrigger};

/// Periodic refresh task
pub struct RefreshScheduler {
    trigger: Arc<dyn RefreshTrigger>,
    interval: Duration,
    startup_refresh: bool,
    shutdown_rx: broadcast::Receiver<()>,
    /// Tick counter
    cycle_count: u64,
}

impl RefreshScheduler {
    /// Create a scheduler
    pub fn new(
        trigger: Arc<dyn RefreshTrigger>,
        interval: Duration,
        startup_refresh: bool,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            trigger,
            interval,
            startup_refresh,
            shutdown_rx,
            cycle_count: 0,
        }
    }

    /// Spawn the scheduler as a background task
    ///
    /// Returns immediately; the startup refresh runs on the spawned task and
    /// never blocks the caller.
    pub fn spawn(
        trigger: Arc<dyn RefreshTrigger>,
        interval: Duration,
        startup_refresh: bool,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let scheduler = Self::new(trigger, interval, startup_refresh, shutdown_rx);
        tokio::spawn(async move {
            scheduler.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(mut self) {
        info!(
            interval_secs = self.interval.as_secs(),
            startup_refresh = self.startup_refresh,
            "Refresh scheduler started"
        );

        // The first tick of an interval fires immediately; delaying the
        // start by one period skips the startup refresh.
        let start = if self.startup_refresh {
            Instant::now()
        } else {
            Instant::now() + self.interval
        };
        let mut interval = tokio::time::interval_at(start, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!(cycles = self.cycle_count, "Refresh scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.cycle_count += 1;
                    let outcome = self.trigger.trigger(RefreshMode::Scheduled).await;
                    log_outcome(self.cycle_count, &outcome);
                }
            }
        }
    }
}

fn log_outcome(cycle: u64, outcome: &RefreshOutcome) {
    match outcome {
        RefreshOutcome::Committed { version } => {
            info!(cycle, version, "Scheduled refresh committed new dataset")
        }
        RefreshOutcome::Unchanged => debug!(cycle, "Scheduled refresh: unchanged"),
        RefreshOutcome::Failed(reason) => {
            warn!(cycle, reason = %reason, "Scheduled refresh failed")
        }
    }
}
