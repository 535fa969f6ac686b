//! Two candidates competing for one role over a shared lock table.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use hotfolder_coord::{
    CoordResult, LeaderInitiator, LeaderSettings, Lifecycle, LockRecord, LockRegistry,
    LockRepository, LockSettings,
};
use hotfolder_events::EventBus;
use hotfolder_store::{MemoryStore, RecordStore, SystemClock};
use hotfolder_telemetry::Metrics;

#[derive(Default)]
struct Poller {
    running: AtomicBool,
}

impl Lifecycle for Poller {
    fn name(&self) -> &str {
        "poller"
    }

    fn start(&self) -> CoordResult<()> {
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

struct Node {
    initiator: LeaderInitiator,
    poller: Arc<Poller>,
}

fn node(store: &Arc<dyn RecordStore<LockRecord>>, node_id: u32) -> Result<Node> {
    let repository = Arc::new(LockRepository::new(
        Arc::clone(store),
        Arc::new(SystemClock),
        LockSettings {
            region: "Default".into(),
            node_id,
            ttl: Duration::from_millis(300),
        },
    ));
    let poller = Arc::new(Poller::default());
    let mut settings = LeaderSettings::new("hotfolder", node_id);
    settings.heartbeat = Duration::from_millis(20);
    settings.busy_wait = Duration::from_millis(20);
    settings.stop_timeout = Duration::from_secs(5);
    let initiator = LeaderInitiator::new(
        settings,
        LockRegistry::new(repository),
        poller.clone(),
        EventBus::new(),
        Metrics::new()?,
    );
    Ok(Node { initiator, poller })
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
fn exactly_one_node_leads_and_leadership_fails_over_on_stop() -> Result<()> {
    let store: Arc<dyn RecordStore<LockRecord>> = Arc::new(MemoryStore::new());
    let first = node(&store, 1)?;
    let second = node(&store, 2)?;

    first.initiator.start()?;
    second.initiator.start()?;
    wait_for(|| first.initiator.is_leader() || second.initiator.is_leader())?;
    thread::sleep(Duration::from_millis(100));
    assert!(first.initiator.is_leader() ^ second.initiator.is_leader());

    let (leader, follower) = if first.initiator.is_leader() {
        (&first, &second)
    } else {
        (&second, &first)
    };
    assert!(leader.poller.is_running());
    assert!(!follower.poller.is_running());

    leader.initiator.stop()?;
    assert!(!leader.poller.is_running());
    wait_for(|| follower.initiator.is_leader())?;
    assert!(follower.poller.is_running());

    follower.initiator.stop()?;
    assert!(store.find(&|_: &LockRecord| true)?.is_empty());
    Ok(())
}
