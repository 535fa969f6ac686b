//! Process-local lock registry handing out RAII guards over repository leases.
//!
//! # Design
//! - A key is reserved locally before the repository is asked, so two threads of one
//!   node never both believe they hold the same lease.
//! - Dropping the guard deletes the lease row and frees the reservation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error};

use crate::lock::LockRepository;

/// Registry of leases held by this process.
#[derive(Debug, Clone)]
pub struct LockRegistry {
    repository: Arc<LockRepository>,
    reserved: Arc<Mutex<HashSet<String>>>,
}

impl LockRegistry {
    /// Construct a registry over `repository`.
    #[must_use]
    pub fn new(repository: Arc<LockRepository>) -> Self {
        Self {
            repository,
            reserved: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Underlying repository.
    #[must_use]
    pub const fn repository(&self) -> &Arc<LockRepository> {
        &self.repository
    }

    /// Try to take the lease on `key` without waiting.
    ///
    /// Returns `None` when another thread of this process holds the key or another
    /// node holds a live lease.
    #[must_use]
    pub fn try_lock(&self, key: &str) -> Option<LockGuard> {
        if !lock_reserved(&self.reserved).insert(key.to_string()) {
            debug!(key, "lock already held in this process");
            return None;
        }
        if self.repository.acquire(key) {
            Some(LockGuard {
                key: key.to_string(),
                repository: Arc::clone(&self.repository),
                reserved: Arc::clone(&self.reserved),
            })
        } else {
            lock_reserved(&self.reserved).remove(key);
            None
        }
    }
}

/// Held lease; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    repository: Arc<LockRepository>,
    reserved: Arc<Mutex<HashSet<String>>>,
}

impl LockGuard {
    /// Locked key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Renew the lease; `false` means it was lost to another node or the store failed.
    #[must_use]
    pub fn renew(&self) -> bool {
        self.repository.acquire(&self.key)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.repository.delete(&self.key);
        lock_reserved(&self.reserved).remove(&self.key);
    }
}

fn lock_reserved(reserved: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    match reserved.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            error!("lock registry mutex poisoned; continuing with recovered guard");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{LockRecord, LockSettings};
    use chrono::{DateTime, TimeDelta, Utc};
    use hotfolder_store::{ManualClock, MemoryStore, RecordStore};

    fn registry(store: &Arc<dyn RecordStore<LockRecord>>, clock: &ManualClock, node: u32) -> LockRegistry {
        LockRegistry::new(Arc::new(LockRepository::new(
            Arc::clone(store),
            Arc::new(clock.clone()),
            LockSettings::for_node(node),
        )))
    }

    #[test]
    fn guard_excludes_local_threads_and_other_nodes_until_dropped() {
        let store: Arc<dyn RecordStore<LockRecord>> = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(1));
        let local = registry(&store, &clock, 1);
        let remote = registry(&store, &clock, 2);

        let guard = local.try_lock("k");
        assert!(guard.is_some());
        assert!(local.try_lock("k").is_none());
        assert!(remote.try_lock("k").is_none());

        drop(guard);
        assert!(!local.repository().is_acquired("k"));
        let remote_guard = remote.try_lock("k");
        assert_eq!(remote_guard.as_ref().map(LockGuard::key), Some("k"));
    }

    #[test]
    fn refused_acquire_frees_local_reservation() {
        let store: Arc<dyn RecordStore<LockRecord>> = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(1));
        let local = registry(&store, &clock, 1);
        let remote = registry(&store, &clock, 2);

        let remote_guard = remote.try_lock("k");
        assert!(local.try_lock("k").is_none());
        drop(remote_guard);
        assert!(local.try_lock("k").is_some());
    }

    #[test]
    fn renew_fails_once_lease_was_taken_over() {
        let store: Arc<dyn RecordStore<LockRecord>> = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(1));
        let local = registry(&store, &clock, 1);
        let remote = registry(&store, &clock, 2);

        let Some(guard) = local.try_lock("k") else {
            panic!("expected lease");
        };
        assert!(guard.renew());
        clock.advance(TimeDelta::seconds(11));
        let takeover = remote.try_lock("k");
        assert!(takeover.is_some());
        assert!(!guard.renew());
    }
}
