//! Record store wrapper with switchable faults.

use std::sync::atomic::{AtomicBool, Ordering};

use hotfolder_store::{
    MemoryStore, Record, RecordFilter, RecordId, RecordStore, StoreError, StoreResult, Stored,
};

/// In-memory store whose operations can be made to fail with [`StoreError::Unavailable`].
#[derive(Debug)]
pub struct FailingStore<R: Record> {
    inner: MemoryStore<R>,
    fail_all: AtomicBool,
    fail_removes: AtomicBool,
}

impl<R: Record> Default for FailingStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> FailingStore<R> {
    /// Healthy empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_all: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
        }
    }

    /// Make every operation fail while `enabled`.
    pub fn fail_all(&self, enabled: bool) {
        self.fail_all.store(enabled, Ordering::SeqCst);
    }

    /// Make `remove` and `remove_all` fail while `enabled`.
    pub fn fail_removes(&self, enabled: bool) {
        self.fail_removes.store(enabled, Ordering::SeqCst);
    }

    fn check(&self, operation: &'static str) -> StoreResult<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable { operation });
        }
        Ok(())
    }

    fn check_remove(&self, operation: &'static str) -> StoreResult<()> {
        self.check(operation)?;
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable { operation });
        }
        Ok(())
    }
}

impl<R: Record> RecordStore<R> for FailingStore<R> {
    fn find(&self, filter: RecordFilter<'_, R>) -> StoreResult<Vec<Stored<R>>> {
        self.check("failing.find")?;
        self.inner.find(filter)
    }

    fn create(&self, record: R) -> StoreResult<Stored<R>> {
        self.check("failing.create")?;
        self.inner.create(record)
    }

    fn save(&self, stored: &Stored<R>) -> StoreResult<()> {
        self.check("failing.save")?;
        self.inner.save(stored)
    }

    fn remove(&self, id: RecordId) -> StoreResult<bool> {
        self.check_remove("failing.remove")?;
        self.inner.remove(id)
    }

    fn remove_all(&self, filter: RecordFilter<'_, R>) -> StoreResult<usize> {
        self.check_remove("failing.remove_all")?;
        self.inner.remove_all(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Row {
        name: String,
    }

    impl Record for Row {
        const TABLE: &'static str = "rows";

        fn unique_key(&self) -> Option<String> {
            None
        }
    }

    #[test]
    fn faults_toggle_on_and_off() -> Result<()> {
        let store = FailingStore::<Row>::new();
        let row = store.create(Row { name: "a".into() })?;

        store.fail_removes(true);
        assert!(store.find(&|_: &Row| true).is_ok());
        assert!(matches!(
            store.remove(row.id),
            Err(StoreError::Unavailable { operation: "failing.remove" })
        ));
        store.fail_removes(false);

        store.fail_all(true);
        assert!(store.find(&|_: &Row| true).is_err());
        store.fail_all(false);
        assert!(store.remove(row.id)?);
        Ok(())
    }
}
