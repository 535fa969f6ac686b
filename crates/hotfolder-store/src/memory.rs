//! Process-local record store.

use std::sync::{Mutex, MutexGuard};

use tracing::error;

use crate::error::StoreResult;
use crate::record::{Record, RecordFilter, RecordId, RecordStore, Stored, Table};

/// Record store that keeps its table in memory behind a mutex.
#[derive(Debug)]
pub struct MemoryStore<R> {
    table: Mutex<Table<R>>,
}

impl<R: Record> MemoryStore<R> {
    /// Construct an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table::default()),
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, Table<R>> {
        match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!(
                    table = R::TABLE,
                    "memory store mutex poisoned; continuing with recovered guard"
                );
                poisoned.into_inner()
            }
        }
    }
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> RecordStore<R> for MemoryStore<R> {
    fn find(&self, filter: RecordFilter<'_, R>) -> StoreResult<Vec<Stored<R>>> {
        Ok(self.lock_table().find(filter))
    }

    fn create(&self, record: R) -> StoreResult<Stored<R>> {
        self.lock_table().create(record)
    }

    fn save(&self, stored: &Stored<R>) -> StoreResult<()> {
        self.lock_table().save(stored)
    }

    fn remove(&self, id: RecordId) -> StoreResult<bool> {
        Ok(self.lock_table().remove(id))
    }

    fn remove_all(&self, filter: RecordFilter<'_, R>) -> StoreResult<usize> {
        Ok(self.lock_table().remove_all(filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{Row, row};
    use anyhow::Result;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn concurrent_creates_of_same_key_admit_exactly_one() -> Result<()> {
        let store = Arc::new(MemoryStore::<Row>::new());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|idx| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    store.create(row("shared", &idx.to_string())).is_ok()
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle
                .join()
                .map_err(|_| anyhow::anyhow!("thread panicked"))?
            {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.find(&|_: &Row| true)?.len(), 1);
        Ok(())
    }

    #[test]
    fn save_updates_payload_in_place() -> Result<()> {
        let store = MemoryStore::<Row>::new();
        let mut stored = store.create(row("k", "v1"))?;
        stored.record.value = "v2".into();
        store.save(&stored)?;
        let found = store.find(&|r: &Row| r.key == "k")?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].record.value, "v2");
        assert!(store.remove(stored.id)?);
        assert!(!store.remove(stored.id)?);
        Ok(())
    }
}
