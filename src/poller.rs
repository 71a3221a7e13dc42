//! Periodic stats refresher.
//!
//! Activation fetches once and keeps that failure on the handle; the
//! schedule starts either way and a fetch runs every interval. A successful
//! tick replaces the snapshot as a whole, a failed tick is logged and leaves
//! the previous snapshot in place.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::WafApi;
use crate::error::{Error, Result};
use crate::types::Stats;

/// Tick outcome counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug)]
struct Shared {
    snapshot: watch::Sender<Option<Stats>>,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Handle to an active stats poller
pub struct StatsPoller {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    interval: Duration,
    initial_error: Option<Error>,
}

impl StatsPoller {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10_000);

    /// Fetch once, then keep refreshing every `interval`.
    ///
    /// Fails only for a zero interval. A failed first fetch leaves the
    /// snapshot empty and is kept in [`StatsPoller::initial_error`]; the
    /// schedule runs regardless.
    pub async fn activate(api: Arc<dyn WafApi>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::Config("poll interval must be > 0".into()));
        }

        let (snapshot, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            snapshot,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let initial_error = match api.get_stats().await {
            Ok(stats) => {
                shared.snapshot.send_replace(Some(stats));
                shared.succeeded.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "initial stats fetch failed");
                Some(e)
            }
        };
        let cancel = CancellationToken::new();

        info!(interval_ms = interval.as_millis() as u64, "activating stats poller");
        let task = tokio::spawn(run(api, interval, shared.clone(), cancel.clone()));

        Ok(Self {
            shared,
            cancel,
            task: Some(task),
            interval,
            initial_error,
        })
    }

    /// Error of the eager fetch made by [`StatsPoller::activate`]
    pub fn initial_error(&self) -> Option<&Error> {
        self.initial_error.as_ref()
    }

    /// Take ownership of the eager fetch's error
    pub fn take_initial_error(&mut self) -> Option<Error> {
        self.initial_error.take()
    }

    /// Latest successfully fetched snapshot
    pub fn snapshot(&self) -> Option<Stats> {
        self.shared.snapshot.borrow().clone()
    }

    /// Watch for snapshot replacements
    pub fn subscribe(&self) -> watch::Receiver<Option<Stats>> {
        self.shared.snapshot.subscribe()
    }

    pub fn stats(&self) -> PollStats {
        PollStats {
            succeeded: self.shared.succeeded.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Cancel the schedule and wait for the task to exit
    pub async fn deactivate(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "stats poller task ended abnormally");
            }
        }
        info!("stats poller deactivated");
    }
}

impl Drop for StatsPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    api: Arc<dyn WafApi>,
    interval: Duration,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            fetched = api.get_stats() => fetched,
        };

        match fetched {
            Ok(stats) => {
                if cancel.is_cancelled() {
                    break;
                }
                shared.snapshot.send_replace(Some(stats));
                shared.succeeded.fetch_add(1, Ordering::Relaxed);
                debug!("stats snapshot refreshed");
            }
            Err(e) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "stats refresh failed, keeping previous snapshot");
            }
        }
    }
}
