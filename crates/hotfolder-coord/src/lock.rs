//! Lease-based advisory locks over the shared record store.
//!
//! # Design
//! - A lock is a row keyed by (key, region); the store's unique constraint admits one
//!   holder, so a lost race surfaces as a failed insert rather than a second holder.
//! - Rows older than the TTL are swept before every acquire/check/delete, one row at a
//!   time so a single failing delete does not block the rest.
//! - Storage faults never escape `acquire`; callers observe "not obtained".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use hotfolder_store::{Clock, Record, RecordStore, StoreResult, Stored};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::CoordResult;
use crate::lifecycle::Lifecycle;

/// Region used when none is configured.
pub const DEFAULT_LOCK_REGION: &str = "Default";
/// Lease length used when none is configured.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_millis(10_000);

/// Persisted lock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Locked resource.
    pub lock_key: String,
    /// Region the lock lives in.
    pub region: String,
    /// Cluster node holding the lock.
    pub node_id: u32,
    /// Last acquire or renewal.
    pub acquired_at: DateTime<Utc>,
}

impl Record for LockRecord {
    const TABLE: &'static str = "locks";

    fn unique_key(&self) -> Option<String> {
        Some(format!("{}\u{1f}{}", self.region, self.lock_key))
    }
}

/// Identity and lease settings of a lock repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSettings {
    /// Region lock rows are written to.
    pub region: String,
    /// Cluster node id recorded on owned rows.
    pub node_id: u32,
    /// Lease length.
    pub ttl: Duration,
}

impl LockSettings {
    /// Settings with the default region and TTL for `node_id`.
    #[must_use]
    pub fn for_node(node_id: u32) -> Self {
        Self {
            region: DEFAULT_LOCK_REGION.to_string(),
            node_id,
            ttl: DEFAULT_LOCK_TTL,
        }
    }
}

/// TTL lock repository shared by the metadata store and leader election.
pub struct LockRepository {
    store: Arc<dyn RecordStore<LockRecord>>,
    clock: Arc<dyn Clock>,
    region: String,
    node_id: u32,
    ttl: TimeDelta,
    running: AtomicBool,
    deleting: Mutex<()>,
}

impl std::fmt::Debug for LockRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockRepository")
            .field("region", &self.region)
            .field("node_id", &self.node_id)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl LockRepository {
    /// Construct a repository over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore<LockRecord>>,
        clock: Arc<dyn Clock>,
        settings: LockSettings,
    ) -> Self {
        Self {
            store,
            clock,
            region: settings.region,
            node_id: settings.node_id,
            ttl: TimeDelta::from_std(settings.ttl).unwrap_or(TimeDelta::MAX),
            running: AtomicBool::new(false),
            deleting: Mutex::new(()),
        }
    }

    /// Region rows are written to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Node id recorded on owned rows.
    #[must_use]
    pub const fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Acquire or renew the lease on `key` for this node.
    ///
    /// Returns `false` when another node holds a live lease or the store fails.
    #[must_use]
    pub fn acquire(&self, key: &str) -> bool {
        debug!(key, region = %self.region, node_id = self.node_id, "acquiring lock");
        match self.try_acquire(key) {
            Ok(()) => true,
            Err(err) if err.is_unique_violation() => {
                debug!(key, region = %self.region, node_id = self.node_id, "lock held by another node");
                false
            }
            Err(err) => {
                debug!(
                    error = %err,
                    key,
                    region = %self.region,
                    node_id = self.node_id,
                    "unable to create or update lock record"
                );
                false
            }
        }
    }

    fn try_acquire(&self, key: &str) -> StoreResult<()> {
        self.sweep_expired(key)?;
        let now = self.clock.now();
        let node_id = self.node_id;
        let owned = self.store.find(&|row: &LockRecord| {
            row.lock_key == key && row.region == self.region && row.node_id == node_id
        })?;
        if let Some(mut stored) = owned.into_iter().next() {
            debug!(key, node_id, "renewing lock record");
            stored.record.acquired_at = now;
            self.store.save(&stored)
        } else {
            debug!(key, node_id, "creating lock record");
            self.store
                .create(LockRecord {
                    lock_key: key.to_string(),
                    region: self.region.clone(),
                    node_id,
                    acquired_at: now,
                })
                .map(|_| ())
        }
    }

    /// Whether any node holds a live lease on `key`.
    #[must_use]
    pub fn is_acquired(&self, key: &str) -> bool {
        let live = self.sweep_expired(key).and_then(|()| {
            let threshold = self.expiry_threshold();
            self.store.find(&|row: &LockRecord| {
                row.lock_key == key && row.region == self.region && row.acquired_at > threshold
            })
        });
        match live {
            Ok(rows) => {
                if let Some(row) = rows.first() {
                    debug!(key, holder = row.record.node_id, "lock found");
                    true
                } else {
                    debug!(key, region = %self.region, "no live lock found");
                    false
                }
            }
            Err(err) => {
                warn!(error = %err, key, "unable to check lock state");
                false
            }
        }
    }

    /// Release this node's lease on `key`.
    pub fn delete(&self, key: &str) {
        debug!(key, region = %self.region, node_id = self.node_id, "releasing lock");
        if let Err(err) = self.sweep_expired(key) {
            debug!(error = %err, key, "expired lock sweep failed");
        }
        let node_id = self.node_id;
        let _deleting = self.lock_deleting();
        match self.store.find(&|row: &LockRecord| {
            row.lock_key == key && row.region == self.region && row.node_id == node_id
        }) {
            Ok(rows) if rows.is_empty() => debug!(key, "no owned lock to release"),
            Ok(rows) => {
                self.delete_rows(&rows);
            }
            Err(err) => warn!(error = %err, key, "unable to look up owned lock"),
        }
    }

    fn sweep_expired(&self, key: &str) -> StoreResult<()> {
        let threshold = self.expiry_threshold();
        let _deleting = self.lock_deleting();
        let expired = self.store.find(&|row: &LockRecord| {
            row.lock_key == key && row.region == self.region && row.acquired_at <= threshold
        })?;
        if !expired.is_empty() {
            debug!(key, region = %self.region, %threshold, count = expired.len(), "sweeping expired locks");
            self.delete_rows(&expired);
        }
        Ok(())
    }

    fn delete_rows(&self, rows: &[Stored<LockRecord>]) -> usize {
        let mut removed = 0;
        for row in rows {
            match self.store.remove(row.id) {
                Ok(true) => removed += 1,
                Ok(false) => debug!(key = %row.record.lock_key, "lock row already gone"),
                Err(err) => debug!(
                    error = %err,
                    key = %row.record.lock_key,
                    node_id = row.record.node_id,
                    "unable to remove lock row"
                ),
            }
        }
        removed
    }

    fn expiry_threshold(&self) -> DateTime<Utc> {
        self.clock
            .now()
            .checked_sub_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn lock_deleting(&self) -> MutexGuard<'_, ()> {
        match self.deleting.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("lock delete mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }

    /// Delete every row this node owns in its region, returning how many were removed.
    pub fn release_all(&self) -> usize {
        let node_id = self.node_id;
        let _deleting = self.lock_deleting();
        match self
            .store
            .find(&|row: &LockRecord| row.region == self.region && row.node_id == node_id)
        {
            Ok(rows) => self.delete_rows(&rows),
            Err(err) => {
                error!(error = %err, region = %self.region, node_id, "unable to list owned locks");
                0
            }
        }
    }
}

impl Lifecycle for LockRepository {
    fn name(&self) -> &str {
        "lock-repository"
    }

    fn start(&self) -> CoordResult<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> CoordResult<()> {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(region = %self.region, node_id = self.node_id, "deleting all owned lock records");
            let removed = self.release_all();
            debug!(removed, "owned lock records deleted");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
