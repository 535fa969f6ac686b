//! Retention sweep for the history table.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

use crate::database::HistoryRecord;
use crate::error::{MonitorError, MonitorResult};
use crate::model::Status;
use hotfolder_store::RecordStore;

/// How a row's status is compared with the cleanup status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusCondition {
    /// Remove rows whose status equals the cleanup status.
    #[default]
    Equal,
    /// Remove rows whose status differs from the cleanup status.
    NotEqual,
}

impl StatusCondition {
    fn matches(self, row: Status, wanted: Status) -> bool {
        let equal = row == wanted;
        match self {
            Self::Equal => equal,
            Self::NotEqual => !equal,
        }
    }
}

/// Removes histories older than a threshold whose status matches a condition.
pub struct HistoryCleanup {
    store: Arc<dyn RecordStore<HistoryRecord>>,
    threshold: TimeDelta,
    status: Status,
    condition: StatusCondition,
}

impl std::fmt::Debug for HistoryCleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryCleanup")
            .field("threshold", &self.threshold)
            .field("status", &self.status)
            .field("condition", &self.condition)
            .finish_non_exhaustive()
    }
}

impl HistoryCleanup {
    /// Cleanup of rows last modified more than `threshold_days` ago.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore<HistoryRecord>>,
        threshold_days: u32,
        status: Status,
        condition: StatusCondition,
    ) -> Self {
        Self {
            store,
            threshold: TimeDelta::days(i64::from(threshold_days)),
            status,
            condition,
        }
    }

    /// Remove matching rows as of `now`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error when the history table cannot be written.
    pub fn cleanup(&self, now: DateTime<Utc>) -> MonitorResult<usize> {
        let cutoff = now - self.threshold;
        let removed = self
            .store
            .remove_all(&|row: &HistoryRecord| {
                row.modified_at < cutoff && self.condition.matches(row.status, self.status)
            })
            .map_err(|source| MonitorError::store("history.cleanup", source))?;
        info!(
            removed,
            status = %self.status,
            cutoff = %cutoff,
            "history cleanup finished"
        );
        Ok(removed)
    }
}
