//! Dedup metadata stores: a durable store serialised through lease locks and a
//! process-local store with write expiry.
//!
//! # Design
//! - The durable store has no native compare-and-swap, so every operation runs under
//!   the per-key lease; contention is reported as [`CoordError::StoreBusy`].
//! - `put_if_absent` reports prior state as [`PutIfAbsent`] instead of an optional value.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use hotfolder_store::{Clock, Record, RecordStore, StoreResult, Stored};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{CoordError, CoordResult};
use crate::registry::LockRegistry;

/// Outcome of [`MetadataStore::put_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutIfAbsent {
    /// The key was not present; the value was stored.
    Absent,
    /// The key was present with this value; nothing was written.
    Present(String),
}

/// Concurrent key/value contract used by the accept-once filter.
pub trait MetadataStore: Send + Sync {
    /// Current value for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::StoreBusy`] when the key is locked elsewhere, or a store error.
    fn get(&self, key: &str) -> CoordResult<Option<String>>;

    /// Store `value` under `key`, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::StoreBusy`] when the key is locked elsewhere, or a store error.
    fn put(&self, key: &str, value: &str) -> CoordResult<()>;

    /// Store `value` only when `key` is absent.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::StoreBusy`] when the key is locked elsewhere, or a store error.
    fn put_if_absent(&self, key: &str, value: &str) -> CoordResult<PutIfAbsent>;

    /// Swap `old` for `new` when the current value equals `old`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::StoreBusy`] when the key is locked elsewhere, or a store error.
    fn replace(&self, key: &str, old: &str, new: &str) -> CoordResult<bool>;

    /// Remove `key`, returning the value it held.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::StoreBusy`] when the key is locked elsewhere, or a store error.
    fn remove(&self, key: &str) -> CoordResult<Option<String>>;
}

/// Persisted dedup row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Region the entry belongs to.
    pub region: String,
    /// Item identity.
    pub key: String,
    /// Opaque token, typically the last-modified time.
    pub value: String,
    /// Last write.
    pub updated_at: DateTime<Utc>,
}

impl Record for MetadataRecord {
    const TABLE: &'static str = "metadata_entries";

    fn unique_key(&self) -> Option<String> {
        Some(format!("{}\u{1f}{}", self.region, self.key))
    }
}

/// Durable metadata store guarded per key by the lock registry.
pub struct LockedMetadataStore {
    store: Arc<dyn RecordStore<MetadataRecord>>,
    locks: LockRegistry,
    clock: Arc<dyn Clock>,
    region: String,
}

impl std::fmt::Debug for LockedMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockedMetadataStore")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl LockedMetadataStore {
    /// Construct a store for `region`.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore<MetadataRecord>>,
        locks: LockRegistry,
        clock: Arc<dyn Clock>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            store,
            locks,
            clock,
            region: region.into(),
        }
    }

    fn locked<T>(
        &self,
        operation: &'static str,
        key: &str,
        op: impl FnOnce() -> StoreResult<T>,
    ) -> CoordResult<T> {
        let lock_key = format!("metadata/{}/{key}", self.region);
        let Some(_guard) = self.locks.try_lock(&lock_key) else {
            debug!(key, region = %self.region, operation, "unable to acquire metadata lock");
            return Err(CoordError::StoreBusy {
                key: key.to_string(),
            });
        };
        op().map_err(|source| CoordError::store(operation, source))
    }

    fn current(&self, key: &str) -> StoreResult<Option<Stored<MetadataRecord>>> {
        let rows = self
            .store
            .find(&|row: &MetadataRecord| row.region == self.region && row.key == key)?;
        Ok(rows.into_iter().next())
    }

    fn create(&self, key: &str, value: &str) -> StoreResult<()> {
        debug!(key, region = %self.region, "creating metadata entry");
        self.store
            .create(MetadataRecord {
                region: self.region.clone(),
                key: key.to_string(),
                value: value.to_string(),
                updated_at: self.clock.now(),
            })
            .map(|_| ())
    }

    fn update(&self, mut stored: Stored<MetadataRecord>, value: &str) -> StoreResult<()> {
        stored.record.value = value.to_string();
        stored.record.updated_at = self.clock.now();
        self.store.save(&stored)
    }
}

impl MetadataStore for LockedMetadataStore {
    fn get(&self, key: &str) -> CoordResult<Option<String>> {
        self.locked("metadata.get", key, || {
            Ok(self.current(key)?.map(|stored| stored.record.value))
        })
    }

    fn put(&self, key: &str, value: &str) -> CoordResult<()> {
        self.locked("metadata.put", key, || match self.current(key)? {
            Some(stored) => self.update(stored, value),
            None => self.create(key, value),
        })
    }

    fn put_if_absent(&self, key: &str, value: &str) -> CoordResult<PutIfAbsent> {
        self.locked("metadata.put_if_absent", key, || match self.current(key)? {
            Some(stored) => Ok(PutIfAbsent::Present(stored.record.value)),
            None => {
                self.create(key, value)?;
                Ok(PutIfAbsent::Absent)
            }
        })
    }

    fn replace(&self, key: &str, old: &str, new: &str) -> CoordResult<bool> {
        self.locked("metadata.replace", key, || match self.current(key)? {
            Some(stored) if stored.record.value == old => {
                debug!(key, old, new, "updating metadata entry");
                self.update(stored, new)?;
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    fn remove(&self, key: &str) -> CoordResult<Option<String>> {
        self.locked("metadata.remove", key, || {
            let Some(stored) = self.current(key)? else {
                return Ok(None);
            };
            debug!(key, region = %self.region, "removing metadata entry");
            self.store.remove(stored.id)?;
            Ok(Some(stored.record.value))
        })
    }
}

#[derive(Debug)]
struct ExpiringEntry {
    value: String,
    written_at: DateTime<Utc>,
    sequence: u64,
}

#[derive(Debug, Default)]
struct ExpiringState {
    entries: HashMap<String, ExpiringEntry>,
    next_sequence: u64,
}

/// Process-local metadata store whose entries expire after a write TTL; the oldest
/// writes are evicted beyond `max_size`.
#[derive(Debug)]
pub struct ExpiringMetadataStore {
    state: Mutex<ExpiringState>,
    clock: Arc<dyn Clock>,
    max_size: usize,
    ttl: TimeDelta,
}

impl ExpiringMetadataStore {
    /// Construct a store bounded to `max_size` entries living `ttl` after their last write.
    #[must_use]
    pub fn new(max_size: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(ExpiringState::default()),
            clock,
            max_size: max_size.max(1),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_state().entries.len()
    }

    /// Whether no live entries remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_state(&self) -> MutexGuard<'_, ExpiringState> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("expiring metadata mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        };
        let threshold = self
            .clock
            .now()
            .checked_sub_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        state.entries.retain(|_, entry| entry.written_at > threshold);
        state
    }

    fn write(&self, state: &mut ExpiringState, key: &str, value: &str) {
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.entries.insert(
            key.to_string(),
            ExpiringEntry {
                value: value.to_string(),
                written_at: self.clock.now(),
                sequence,
            },
        );
        while state.entries.len() > self.max_size {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.sequence)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(oldest) => {
                    debug!(key = %oldest, "evicting oldest metadata entry");
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

impl MetadataStore for ExpiringMetadataStore {
    fn get(&self, key: &str) -> CoordResult<Option<String>> {
        Ok(self
            .live_state()
            .entries
            .get(key)
            .map(|entry| entry.value.clone()))
    }

    fn put(&self, key: &str, value: &str) -> CoordResult<()> {
        let mut state = self.live_state();
        self.write(&mut state, key, value);
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: &str) -> CoordResult<PutIfAbsent> {
        let mut state = self.live_state();
        if let Some(entry) = state.entries.get(key) {
            return Ok(PutIfAbsent::Present(entry.value.clone()));
        }
        self.write(&mut state, key, value);
        Ok(PutIfAbsent::Absent)
    }

    fn replace(&self, key: &str, old: &str, new: &str) -> CoordResult<bool> {
        let mut state = self.live_state();
        if state.entries.get(key).is_some_and(|entry| entry.value == old) {
            self.write(&mut state, key, new);
            return Ok(true);
        }
        Ok(false)
    }

    fn remove(&self, key: &str) -> CoordResult<Option<String>> {
        Ok(self
            .live_state()
            .entries
            .remove(key)
            .map(|entry| entry.value))
    }
}
