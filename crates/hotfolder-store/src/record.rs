//! Record contract and the store capability shared by every table.
//!
//! # Design
//! - Rows are plain serde values; the store assigns identifiers.
//! - Uniqueness is declared by the record and enforced by the store, never by callers.
//! - Lookups take a predicate so tables can be queried by any field combination.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Identifier assigned to a stored row.
pub type RecordId = u64;

/// Predicate used to select rows.
pub type RecordFilter<'a, R> = &'a dyn Fn(&R) -> bool;

/// A row type that can be kept in a [`RecordStore`].
pub trait Record: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Table name, also used as the file stem for file-backed stores.
    const TABLE: &'static str;

    /// Key covered by the table's unique constraint, if any.
    fn unique_key(&self) -> Option<String>;
}

/// A row together with its store-assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stored<R> {
    /// Identifier assigned on create.
    pub id: RecordId,
    /// Row payload.
    pub record: R,
}

/// Durable table capability: find by predicate, create, save, remove, remove-all.
pub trait RecordStore<R: Record>: Send + Sync {
    /// Return every row matching `filter`, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn find(&self, filter: RecordFilter<'_, R>) -> StoreResult<Vec<Stored<R>>>;

    /// Insert a new row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] when another row holds the same unique key.
    fn create(&self, record: R) -> StoreResult<Stored<R>>;

    /// Overwrite an existing row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the row was removed in the meantime, or
    /// [`StoreError::UniqueViolation`] when the new payload collides with another row.
    fn save(&self, stored: &Stored<R>) -> StoreResult<()>;

    /// Remove one row, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn remove(&self, id: RecordId) -> StoreResult<bool>;

    /// Remove every row matching `filter`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn remove_all(&self, filter: RecordFilter<'_, R>) -> StoreResult<usize>;
}

impl<R: Record, S: RecordStore<R> + ?Sized> RecordStore<R> for Arc<S> {
    fn find(&self, filter: RecordFilter<'_, R>) -> StoreResult<Vec<Stored<R>>> {
        (**self).find(filter)
    }

    fn create(&self, record: R) -> StoreResult<Stored<R>> {
        (**self).create(record)
    }

    fn save(&self, stored: &Stored<R>) -> StoreResult<()> {
        (**self).save(stored)
    }

    fn remove(&self, id: RecordId) -> StoreResult<bool> {
        (**self).remove(id)
    }

    fn remove_all(&self, filter: RecordFilter<'_, R>) -> StoreResult<usize> {
        (**self).remove_all(filter)
    }
}

/// In-memory table state shared by the concrete stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "R: Serialize", deserialize = "R: DeserializeOwned"))]
pub(crate) struct Table<R> {
    next_id: RecordId,
    rows: BTreeMap<RecordId, R>,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl<R: Record> Table<R> {
    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn find(&self, filter: RecordFilter<'_, R>) -> Vec<Stored<R>> {
        self.rows
            .iter()
            .filter(|(_, record)| filter(record))
            .map(|(id, record)| Stored {
                id: *id,
                record: record.clone(),
            })
            .collect()
    }

    pub(crate) fn create(&mut self, record: R) -> StoreResult<Stored<R>> {
        self.ensure_unique(None, &record)?;
        let id = self.next_id;
        self.next_id += 1;
        self.rows.insert(id, record.clone());
        Ok(Stored { id, record })
    }

    pub(crate) fn save(&mut self, stored: &Stored<R>) -> StoreResult<()> {
        if !self.rows.contains_key(&stored.id) {
            return Err(StoreError::NotFound {
                table: R::TABLE,
                id: stored.id,
            });
        }
        self.ensure_unique(Some(stored.id), &stored.record)?;
        self.rows.insert(stored.id, stored.record.clone());
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: RecordId) -> bool {
        self.rows.remove(&id).is_some()
    }

    pub(crate) fn remove_all(&mut self, filter: RecordFilter<'_, R>) -> usize {
        let before = self.rows.len();
        self.rows.retain(|_, record| !filter(record));
        before - self.rows.len()
    }

    fn ensure_unique(&self, skip: Option<RecordId>, record: &R) -> StoreResult<()> {
        let Some(unique_key) = record.unique_key() else {
            return Ok(());
        };
        let collision = self.rows.iter().any(|(id, existing)| {
            Some(*id) != skip && existing.unique_key().as_deref() == Some(unique_key.as_str())
        });
        if collision {
            return Err(StoreError::UniqueViolation {
                table: R::TABLE,
                unique_key,
            });
        }
        Ok(())
    }
}
