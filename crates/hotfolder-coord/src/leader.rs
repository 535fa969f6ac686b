//! Leader election over the lock registry.
//!
//! # Design
//! - Each initiator owns exactly one named executor thread, spawned on the first start
//!   and kept for the initiator's lifetime; between elections it parks on its command
//!   channel.
//! - While following, the loop retries the lease every `busy_wait`; while leading it
//!   renews every `heartbeat` and steps down as soon as a renewal fails.
//! - The gated component is started on grant and stopped on revoke, including the final
//!   revoke when the initiator stops.
//! - `stop` waits at most `stop_timeout` for the executor to resign.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hotfolder_events::{Event, EventBus};
use hotfolder_telemetry::Metrics;
use tracing::{debug, error, info, warn};

use crate::error::{CoordError, CoordResult};
use crate::lifecycle::Lifecycle;
use crate::registry::{LockGuard, LockRegistry};

/// Election identity and timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderSettings {
    /// Role the election gates.
    pub role: String,
    /// Lock key candidates compete for.
    pub lock_key: String,
    /// Tenant the election thread is named after.
    pub tenant: String,
    /// Cluster node id of this candidate.
    pub node_id: u32,
    /// Renewal interval while leading.
    pub heartbeat: Duration,
    /// Retry interval while following.
    pub busy_wait: Duration,
    /// Bound on waiting for the election thread at shutdown.
    pub stop_timeout: Duration,
}

impl LeaderSettings {
    /// Settings with the default timing for `role` on `node_id`.
    #[must_use]
    pub fn new(role: impl Into<String>, node_id: u32) -> Self {
        let role = role.into();
        Self {
            lock_key: format!("{role}-leader"),
            role,
            tenant: "master".to_string(),
            node_id,
            heartbeat: Duration::from_millis(500),
            busy_wait: Duration::from_millis(50),
            stop_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Elect,
    Resign,
    Shutdown,
}

struct Executor {
    commands: Sender<Command>,
    resigned: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Executor {
    fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Runs the candidate loop and starts/stops the gated component with leadership.
pub struct LeaderInitiator {
    candidate: Arc<Candidate>,
    executor: Mutex<Option<Executor>>,
    electing: AtomicBool,
}

impl std::fmt::Debug for LeaderInitiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderInitiator")
            .field("settings", &self.candidate.settings)
            .field("leader", &self.is_leader())
            .finish_non_exhaustive()
    }
}

impl LeaderInitiator {
    /// Construct an initiator gating `component`.
    #[must_use]
    pub fn new(
        settings: LeaderSettings,
        locks: LockRegistry,
        component: Arc<dyn Lifecycle>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        Self {
            candidate: Arc::new(Candidate {
                settings,
                locks,
                component,
                events,
                metrics,
                leader: AtomicBool::new(false),
            }),
            executor: Mutex::new(None),
            electing: AtomicBool::new(false),
        }
    }

    /// Whether this node currently leads the role.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.candidate.leader.load(Ordering::SeqCst)
    }

    /// Role the election gates.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.candidate.settings.role
    }

    fn spawn_executor(&self) -> CoordResult<Executor> {
        let settings = &self.candidate.settings;
        let (commands, command_rx) = mpsc::channel();
        let (resigned_tx, resigned) = mpsc::channel();
        let candidate = Arc::clone(&self.candidate);
        let handle = thread::Builder::new()
            .name(format!(
                "hotfolder-leader-{}-{}",
                settings.tenant, settings.role
            ))
            .spawn(move || candidate.serve(&command_rx, &resigned_tx))
            .map_err(|source| CoordError::Spawn {
                role: settings.role.clone(),
                source,
            })?;
        debug!(role = %settings.role, "election executor spawned");
        Ok(Executor {
            commands,
            resigned,
            handle: Some(handle),
        })
    }

    fn lock_executor(&self) -> MutexGuard<'_, Option<Executor>> {
        match self.executor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("leader executor mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Lifecycle for LeaderInitiator {
    fn name(&self) -> &str {
        "leader-initiator"
    }

    fn start(&self) -> CoordResult<()> {
        let mut slot = self.lock_executor();
        if self.electing.load(Ordering::SeqCst) {
            debug!(role = %self.role(), "election already running");
            return Ok(());
        }
        let executor = match slot.take() {
            Some(executor) => executor,
            None => self.spawn_executor()?,
        };
        if executor.commands.send(Command::Elect).is_err() {
            return Err(CoordError::lifecycle(
                self.name(),
                "election executor exited",
            ));
        }
        *slot = Some(executor);
        self.electing.store(true, Ordering::SeqCst);
        let settings = &self.candidate.settings;
        info!(role = %settings.role, node_id = settings.node_id, "leader election started");
        Ok(())
    }

    fn stop(&self) -> CoordResult<()> {
        let slot = self.lock_executor();
        let Some(executor) = slot.as_ref() else {
            return Ok(());
        };
        if !self.electing.load(Ordering::SeqCst) {
            return Ok(());
        }
        // Acks left behind by a stop that timed out.
        while executor.resigned.try_recv().is_ok() {}
        if executor.commands.send(Command::Resign).is_err() {
            self.electing.store(false, Ordering::SeqCst);
            warn!(role = %self.role(), "election executor already exited");
            return Ok(());
        }
        debug!(role = %self.role(), "waiting for election executor to resign");
        match executor
            .resigned
            .recv_timeout(self.candidate.settings.stop_timeout)
        {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.electing.store(false, Ordering::SeqCst);
                info!(role = %self.role(), "leader election stopped");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(role = %self.role(), "election executor did not resign in time");
                Err(CoordError::StopTimeout {
                    role: self.role().to_string(),
                })
            }
        }
    }

    fn is_running(&self) -> bool {
        self.electing.load(Ordering::SeqCst)
            && self.lock_executor().as_ref().is_some_and(Executor::is_alive)
    }
}

impl Drop for LeaderInitiator {
    fn drop(&mut self) {
        let Some(mut executor) = self.lock_executor().take() else {
            return;
        };
        let _ = executor.commands.send(Command::Shutdown);
        if let Some(handle) = executor.handle.take()
            && handle.join().is_err()
        {
            warn!(role = %self.role(), "election executor panicked");
        }
    }
}

struct Candidate {
    settings: LeaderSettings,
    locks: LockRegistry,
    component: Arc<dyn Lifecycle>,
    events: EventBus,
    metrics: Metrics,
    leader: AtomicBool,
}

impl Candidate {
    fn serve(&self, commands: &Receiver<Command>, resigned: &Sender<()>) {
        loop {
            match commands.recv() {
                Ok(Command::Elect) => {
                    if self.run(commands) == Command::Shutdown {
                        break;
                    }
                    let _ = resigned.send(());
                }
                Ok(Command::Resign) => {
                    let _ = resigned.send(());
                }
                Ok(Command::Shutdown) | Err(_) => break,
            }
        }
        debug!(role = %self.settings.role, "election executor exiting");
    }

    fn run(&self, commands: &Receiver<Command>) -> Command {
        let mut held: Option<LockGuard> = None;
        let ended = loop {
            let pause = match held.take() {
                None => match self.locks.try_lock(&self.settings.lock_key) {
                    Some(guard) if self.granted() => {
                        held = Some(guard);
                        self.settings.heartbeat
                    }
                    _ => self.settings.busy_wait,
                },
                Some(guard) => {
                    if guard.renew() {
                        held = Some(guard);
                        self.settings.heartbeat
                    } else {
                        warn!(role = %self.settings.role, "leadership lease lost");
                        self.revoked();
                        drop(guard);
                        self.settings.busy_wait
                    }
                }
            };
            match commands.recv_timeout(pause) {
                Err(RecvTimeoutError::Timeout) | Ok(Command::Elect) => {}
                Ok(Command::Resign) => break Command::Resign,
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    break Command::Shutdown;
                }
            }
        };
        if let Some(guard) = held {
            self.revoked();
            drop(guard);
        }
        ended
    }

    fn granted(&self) -> bool {
        let role = &self.settings.role;
        info!(role = %role, node_id = self.settings.node_id, "leadership granted");
        if let Err(err) = self.component.start() {
            error!(
                error = %err,
                role = %role,
                component = self.component.name(),
                "failed to start gated component; relinquishing leadership"
            );
            return false;
        }
        self.leader.store(true, Ordering::SeqCst);
        self.metrics.record_leadership(role, true);
        self.events.publish(Event::LeadershipGranted {
            role: role.clone(),
            node_id: self.settings.node_id,
        });
        true
    }

    fn revoked(&self) {
        let role = &self.settings.role;
        info!(role = %role, node_id = self.settings.node_id, "leadership revoked");
        self.leader.store(false, Ordering::SeqCst);
        if let Err(err) = self.component.stop() {
            error!(
                error = %err,
                role = %role,
                component = self.component.name(),
                "failed to stop gated component"
            );
        }
        self.metrics.record_leadership(role, false);
        self.events.publish(Event::LeadershipRevoked {
            role: role.clone(),
            node_id: self.settings.node_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{LockRecord, LockRepository, LockSettings};
    use anyhow::{Result, bail};
    use chrono::{DateTime, TimeDelta, Utc};
    use hotfolder_store::{ManualClock, MemoryStore, RecordStore, SystemClock};
    use std::time::Instant;

    #[derive(Default)]
    struct Gate {
        running: AtomicBool,
        starts: std::sync::atomic::AtomicUsize,
        threads: Mutex<Vec<thread::ThreadId>>,
    }

    impl Lifecycle for Gate {
        fn name(&self) -> &str {
            "gate"
        }

        fn start(&self) -> CoordResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut threads) = self.threads.lock() {
                threads.push(thread::current().id());
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) -> CoordResult<()> {
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    fn wait_for(condition: impl Fn() -> bool) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            if Instant::now() > deadline {
                bail!("condition not reached in time");
            }
            thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    #[test]
    fn single_candidate_leads_and_steps_down_on_stop() -> Result<()> {
        let store: Arc<dyn RecordStore<LockRecord>> = Arc::new(MemoryStore::new());
        let repository = Arc::new(LockRepository::new(
            Arc::clone(&store),
            Arc::new(SystemClock),
            LockSettings::for_node(1),
        ));
        let gate = Arc::new(Gate::default());
        let events = EventBus::new();
        let metrics = Metrics::new()?;
        let mut settings = LeaderSettings::new("hotfolder", 1);
        settings.heartbeat = Duration::from_millis(10);
        settings.busy_wait = Duration::from_millis(10);
        let initiator = LeaderInitiator::new(
            settings,
            LockRegistry::new(Arc::clone(&repository)),
            gate.clone(),
            events.clone(),
            metrics.clone(),
        );

        initiator.start()?;
        initiator.start()?;
        assert!(initiator.is_running());
        wait_for(|| initiator.is_leader())?;
        assert!(gate.is_running());
        assert!(metrics.is_leader("hotfolder"));
        assert!(repository.is_acquired("hotfolder-leader"));

        initiator.stop()?;
        assert!(!initiator.is_running());
        assert!(!initiator.is_leader());
        assert!(!gate.is_running());
        assert_eq!(gate.starts.load(Ordering::SeqCst), 1);
        assert!(!repository.is_acquired("hotfolder-leader"));

        let kinds: Vec<_> = events.recent().iter().map(|e| e.event.kind()).collect();
        assert_eq!(kinds, vec!["leadership_granted", "leadership_revoked"]);
        Ok(())
    }

    fn fast_settings() -> LeaderSettings {
        let mut settings = LeaderSettings::new("hotfolder", 1);
        settings.heartbeat = Duration::from_millis(10);
        settings.busy_wait = Duration::from_millis(10);
        settings
    }

    #[test]
    fn restarts_reuse_the_single_executor_thread() -> Result<()> {
        let store: Arc<dyn RecordStore<LockRecord>> = Arc::new(MemoryStore::new());
        let repository = Arc::new(LockRepository::new(
            store,
            Arc::new(SystemClock),
            LockSettings::for_node(1),
        ));
        let gate = Arc::new(Gate::default());
        let initiator = LeaderInitiator::new(
            fast_settings(),
            LockRegistry::new(repository),
            gate.clone(),
            EventBus::new(),
            Metrics::new()?,
        );

        for _ in 0..2 {
            initiator.start()?;
            wait_for(|| initiator.is_leader())?;
            initiator.stop()?;
            assert!(!initiator.is_running());
            assert!(!gate.is_running());
        }

        let threads = gate.threads.lock().map(|t| t.clone()).unwrap_or_default();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0], threads[1]);
        assert_ne!(threads[0], thread::current().id());
        Ok(())
    }

    #[test]
    fn lease_taken_after_expiry_revokes_leadership() -> Result<()> {
        let store: Arc<dyn RecordStore<LockRecord>> = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(1));
        let repository = Arc::new(LockRepository::new(
            Arc::clone(&store),
            Arc::new(clock.clone()),
            LockSettings::for_node(1),
        ));
        let rival = LockRepository::new(
            Arc::clone(&store),
            Arc::new(clock.clone()),
            LockSettings::for_node(2),
        );
        let gate = Arc::new(Gate::default());
        let events = EventBus::new();
        let metrics = Metrics::new()?;
        let initiator = LeaderInitiator::new(
            fast_settings(),
            LockRegistry::new(repository),
            gate.clone(),
            events.clone(),
            metrics.clone(),
        );

        initiator.start()?;
        wait_for(|| initiator.is_leader() && gate.is_running())?;

        wait_for(|| {
            clock.advance(TimeDelta::seconds(11));
            rival.acquire("hotfolder-leader")
        })?;
        wait_for(|| !initiator.is_leader() && !gate.is_running())?;
        assert!(initiator.is_running());
        assert!(!metrics.is_leader("hotfolder"));

        initiator.stop()?;
        let rows = store.find(&|_: &LockRecord| true)?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.node_id, 2);
        assert_eq!(gate.starts.load(Ordering::SeqCst), 1);

        let kinds: Vec<_> = events.recent().iter().map(|e| e.event.kind()).collect();
        assert_eq!(kinds, vec!["leadership_granted", "leadership_revoked"]);
        Ok(())
    }
}
