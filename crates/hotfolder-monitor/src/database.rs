//! History persistence: the recorder that writes histories and the restorer that reads them back.
//!
//! # Design
//! - One row per (area, key); entries are embedded in the row.
//! - Entries receive their id on first persist, which marks them as saved for metrics.
//! - Store failures are logged and swallowed so the pipeline never fails on bookkeeping.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hotfolder_store::{Clock, Record, RecordStore, StoreError, Stored};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{MonitorError, MonitorResult};
use crate::model::{HistoryData, HistoryEntry, Status, SystemArea};
use crate::recorder::MonitorRecorder;
use crate::service::HistoryRestorer;

/// Persisted history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Subsystem.
    pub area: SystemArea,
    /// Item key.
    pub key: String,
    /// Status at the last record.
    pub status: Status,
    /// Message of the most recent step failure.
    pub exception_message: Option<String>,
    /// Entries, oldest first.
    pub entries: Vec<HistoryEntry>,
    /// First persist time.
    pub created_at: DateTime<Utc>,
    /// Last persist time.
    pub modified_at: DateTime<Utc>,
}

impl Record for HistoryRecord {
    const TABLE: &'static str = "monitor_histories";

    fn unique_key(&self) -> Option<String> {
        None
    }
}

/// Writes histories to the history table.
pub struct DatabaseRecorder {
    store: Arc<dyn RecordStore<HistoryRecord>>,
    clock: Arc<dyn Clock>,
    enabled: bool,
}

impl std::fmt::Debug for DatabaseRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseRecorder")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl DatabaseRecorder {
    /// Recorder over `store`, stamping rows with `clock`.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore<HistoryRecord>>,
        clock: Arc<dyn Clock>,
        enabled: bool,
    ) -> Self {
        Self {
            store,
            clock,
            enabled,
        }
    }

    fn persist(&self, history: &mut HistoryData) -> MonitorResult<()> {
        for entry in history.entries.iter_mut().filter(|entry| entry.id.is_none()) {
            entry.id = Some(Uuid::new_v4());
        }
        let now = self.clock.now();
        let mut row = HistoryRecord {
            area: history.area,
            key: history.key.clone(),
            status: history.status,
            exception_message: history.exception_message.clone(),
            entries: history.entries.clone(),
            created_at: now,
            modified_at: now,
        };

        if let Some(id) = history.record_id {
            let existing = self
                .store
                .find(&|candidate: &HistoryRecord| {
                    candidate.area == history.area && candidate.key == history.key
                })
                .map_err(|source| MonitorError::store("history.load", source))?
                .into_iter()
                .find(|stored| stored.id == id);
            if let Some(existing) = existing {
                row.created_at = existing.record.created_at;
            }
            match self.store.save(&Stored { id, record: row.clone() }) {
                Ok(()) => return Ok(()),
                Err(StoreError::NotFound { .. }) => {
                    debug!(area = %history.area, key = %history.key, "history row vanished; recreating");
                }
                Err(source) => return Err(MonitorError::store("history.save", source)),
            }
        }

        let stored = self
            .store
            .create(row)
            .map_err(|source| MonitorError::store("history.create", source))?;
        history.record_id = Some(stored.id);
        Ok(())
    }
}

impl MonitorRecorder for DatabaseRecorder {
    fn name(&self) -> &'static str {
        "database"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn record(&self, history: &mut HistoryData) {
        if let Err(err) = self.persist(history) {
            error!(
                error = %err,
                area = %history.area,
                key = %history.key,
                "failed to persist history"
            );
        }
    }
}

/// Restores histories from the history table.
pub struct DatabaseRestorer {
    store: Arc<dyn RecordStore<HistoryRecord>>,
}

impl std::fmt::Debug for DatabaseRestorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseRestorer").finish_non_exhaustive()
    }
}

impl DatabaseRestorer {
    /// Restorer over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore<HistoryRecord>>) -> Self {
        Self { store }
    }
}

impl HistoryRestorer for DatabaseRestorer {
    fn restore(&self, area: SystemArea, key: &str) -> HistoryData {
        let rows = match self
            .store
            .find(&|row: &HistoryRecord| row.area == area && row.key == key)
        {
            Ok(rows) => rows,
            Err(err) => {
                error!(error = %err, area = %area, key, "failed to load history; starting fresh");
                return HistoryData::new(area, key);
            }
        };
        if rows.len() > 1 {
            error!(area = %area, key, rows = rows.len(), "multiple histories stored for key; using the first");
        }
        let Some(Stored { id, record }) = rows.into_iter().next() else {
            return HistoryData::new(area, key);
        };
        HistoryData {
            record_id: Some(id),
            area: record.area,
            key: record.key,
            status: record.status,
            status_when_resumed: Some(record.status),
            exception_message: record.exception_message,
            entries: record.entries,
        }
    }
}
