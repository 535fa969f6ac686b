//! JSON-file backed record store.
//!
//! # Design
//! - One pretty-printed JSON document per table under a data directory, plus a sibling
//!   `.lock` file used for advisory `flock`-style locking.
//! - Every read reloads the document under a shared lock and every mutation reloads,
//!   applies, and writes it back under an exclusive lock, so nodes sharing a data
//!   directory never overwrite each other's rows.
//! - Writes go to a temp file that is renamed into place; a failed mutation leaves the
//!   document unchanged.

use std::fs::{self, File, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::record::{Record, RecordFilter, RecordId, RecordStore, Stored, Table};

const TABLE_SUFFIX: &str = ".json";
const TEMP_SUFFIX: &str = ".json.tmp";
const LOCK_SUFFIX: &str = ".json.lock";

/// Record store persisting its table as JSON in a data directory.
#[derive(Debug)]
pub struct JsonFileStore<R> {
    path: PathBuf,
    lock_path: PathBuf,
    rows: PhantomData<fn() -> R>,
}

impl<R: Record> JsonFileStore<R> {
    /// Open (or create) the table file for `R` inside `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing table file
    /// cannot be read or parsed.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(data_dir)
            .map_err(|source| StoreError::io("table.create_dir", data_dir, source))?;
        let store = Self {
            path: data_dir.join(format!("{}{TABLE_SUFFIX}", R::TABLE)),
            lock_path: data_dir.join(format!("{}{LOCK_SUFFIX}", R::TABLE)),
            rows: PhantomData,
        };
        let lock = store.file_lock(false)?;
        let table = store.load()?;
        drop(lock);
        debug!(
            table = R::TABLE,
            path = %store.path.display(),
            rows = table.len(),
            "opened file-backed table"
        );
        Ok(store)
    }

    /// Location of the table file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the advisory lock; it is released when the returned handle drops.
    fn file_lock(&self, exclusive: bool) -> StoreResult<File> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|source| StoreError::io("table.lock_open", &self.lock_path, source))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|source| StoreError::io("table.lock", &self.lock_path, source))?;
        Ok(file)
    }

    fn load(&self) -> StoreResult<Table<R>> {
        if !self.path.exists() {
            return Ok(Table::default());
        }
        let raw = fs::read_to_string(&self.path)
            .map_err(|source| StoreError::io("table.read", &self.path, source))?;
        serde_json::from_str(&raw).map_err(|source| StoreError::json("table.parse", &self.path, source))
    }

    fn mutate<T>(&self, op: impl FnOnce(&mut Table<R>) -> StoreResult<T>) -> StoreResult<T> {
        let lock = self.file_lock(true)?;
        let mut table = self.load()?;
        let result = op(&mut table)?;
        self.persist(&table)?;
        drop(lock);
        Ok(result)
    }

    fn persist(&self, table: &Table<R>) -> StoreResult<()> {
        let serialised = serde_json::to_string_pretty(table)
            .map_err(|source| StoreError::json("table.serialize", &self.path, source))?;
        let temp = self
            .path
            .with_file_name(format!("{}{TEMP_SUFFIX}", R::TABLE));
        fs::write(&temp, serialised)
            .map_err(|source| StoreError::io("table.write", &temp, source))?;
        fs::rename(&temp, &self.path)
            .map_err(|source| StoreError::io("table.rename", &self.path, source))
    }
}

impl<R: Record> RecordStore<R> for JsonFileStore<R> {
    fn find(&self, filter: RecordFilter<'_, R>) -> StoreResult<Vec<Stored<R>>> {
        let lock = self.file_lock(false)?;
        let table = self.load()?;
        drop(lock);
        Ok(table.find(filter))
    }

    fn create(&self, record: R) -> StoreResult<Stored<R>> {
        self.mutate(|table| table.create(record))
    }

    fn save(&self, stored: &Stored<R>) -> StoreResult<()> {
        self.mutate(|table| table.save(stored))
    }

    fn remove(&self, id: RecordId) -> StoreResult<bool> {
        self.mutate(|table| Ok(table.remove(id)))
    }

    fn remove_all(&self, filter: RecordFilter<'_, R>) -> StoreResult<usize> {
        self.mutate(|table| Ok(table.remove_all(filter)))
    }
}
