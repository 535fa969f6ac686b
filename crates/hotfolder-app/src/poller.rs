//! Polling lifecycle that synchronizes and routes on a fixed interval while this node leads.
//!
//! # Design
//! - One named thread per start; stop signals it over a channel and joins it.
//! - A poll drains exactly one synchronization cycle so a busy remote cannot starve the
//!   stop signal.
//! - A failed cycle is logged and retried on the next tick; rollback already made the
//!   unprocessed items eligible again.
//! - After [`DEGRADED_AFTER`] consecutive failed cycles the poller is reported degraded;
//!   the next clean cycle reports it recovered.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hotfolder_coord::{CoordError, CoordResult, Lifecycle};
use hotfolder_sync::{SyncError, SynchronizingSource};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::health::HealthTracker;
use crate::router::{RouteOutcome, Router};

const POLLER_NAME: &str = "hotfolder-poller";
const HEALTH_COMPONENT: &str = "poller";

/// Consecutive failed synchronization cycles before the poller is reported degraded.
pub const DEGRADED_AFTER: u32 = 3;

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

struct PollerInner {
    source: Arc<SynchronizingSource>,
    router: Router,
    interval: Duration,
    health: HealthTracker,
}

impl PollerInner {
    fn poll_once(&self) -> AppResult<usize> {
        let mut routed = 0;
        let mut next = self
            .source
            .receive()
            .map_err(|err| AppError::sync("poller.receive", err))?;
        while let Some(file) = next {
            match self.router.route(&file) {
                Ok(RouteOutcome::Routed { .. }) => routed += 1,
                Ok(RouteOutcome::Unmatched) => {}
                Err(err) => {
                    warn!(error = %err, path = %file.local_path.display(), "routing failed");
                }
            }
            next = if self.source.pending() > 0 {
                self.source
                    .receive()
                    .map_err(|err| AppError::sync("poller.receive", err))?
            } else {
                None
            };
        }
        Ok(routed)
    }

    fn run(&self, stop_rx: &Receiver<()>) {
        let mut failures = 0_u32;
        loop {
            match self.poll_once() {
                Ok(routed) => {
                    if routed > 0 {
                        debug!(routed, "poll cycle finished");
                    }
                    failures = 0;
                    self.health.mark_recovered(HEALTH_COMPONENT);
                }
                Err(
                    err @ AppError::Sync {
                        source: SyncError::Synchronize { .. },
                        ..
                    },
                ) => {
                    failures = failures.saturating_add(1);
                    warn!(error = %err, failures, "poll cycle failed");
                    if failures >= DEGRADED_AFTER {
                        self.health.mark_degraded(HEALTH_COMPONENT, &err.to_string());
                    }
                }
                Err(err) => warn!(error = %err, "poll cycle failed"),
            }
            match stop_rx.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

/// Runs synchronize-then-route cycles on a background thread.
pub struct Poller {
    inner: Arc<PollerInner>,
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("interval", &self.inner.interval)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Poller {
    /// Poller draining `source` into `router` every `interval`, reporting repeated
    /// failures to `health`.
    #[must_use]
    pub fn new(
        source: Arc<SynchronizingSource>,
        router: Router,
        interval: Duration,
        health: HealthTracker,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                source,
                router,
                interval,
                health,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Run one cycle on the calling thread, returning how many files were routed.
    ///
    /// # Errors
    ///
    /// Returns an error when the source is stopped or the synchronization cycle fails.
    pub fn poll_once(&self) -> AppResult<usize> {
        self.inner.poll_once()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("poller worker mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Lifecycle for Poller {
    fn name(&self) -> &str {
        POLLER_NAME
    }

    fn start(&self) -> CoordResult<()> {
        let mut slot = self.lock_worker();
        if slot.is_some() {
            debug!("poller already running");
            return Ok(());
        }
        self.inner.source.start()?;
        let (stop_tx, stop_rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name(POLLER_NAME.to_string())
            .spawn(move || inner.run(&stop_rx))
            .map_err(|source| CoordError::lifecycle(POLLER_NAME, source))?;
        info!(interval_ms = self.inner.interval.as_millis(), "poller started");
        *slot = Some(Worker { stop_tx, handle });
        Ok(())
    }

    fn stop(&self) -> CoordResult<()> {
        let worker = self.lock_worker().take();
        if let Some(worker) = worker {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                warn!("poller thread panicked");
            }
            info!("poller stopped");
        }
        self.inner.source.stop()
    }

    fn is_running(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }
}
