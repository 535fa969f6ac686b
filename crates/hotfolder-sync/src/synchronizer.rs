//! One synchronization cycle: list, order, select, cap, and transfer.
//!
//! # Design
//! - A fetch cap of zero short-circuits before the filter runs, so nothing is marked.
//! - Items selected but not processed (over the cap, or after a failure) are rolled back
//!   in the filter and become eligible again on the next cycle.
//! - Rollback after a failure races with other nodes that may accept the same items in
//!   between; the next cycle converges.

use std::path::Path;
use std::sync::Arc;

use hotfolder_events::{Event, EventBus};
use hotfolder_telemetry::Metrics;
use tracing::{debug, error, info};

use crate::compare::ItemComparator;
use crate::error::{SyncError, SyncResult};
use crate::filter::FileListFilter;
use crate::remote::{RemoteItem, RemoteStorage};
use crate::transfer::{TransferEngine, TransferOutcome, TransferredFile};

/// Lists the remote directory and hands selected items to the transfer engine.
pub struct Synchronizer {
    remote: Arc<dyn RemoteStorage>,
    filter: Arc<dyn FileListFilter>,
    comparator: Option<Arc<dyn ItemComparator>>,
    engine: TransferEngine,
    metrics: Metrics,
    events: EventBus,
    remote_directory: String,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("remote_directory", &self.remote_directory)
            .field("comparator", &self.comparator)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl Synchronizer {
    /// Synchronizer for `remote_directory`.
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteStorage>,
        filter: Arc<dyn FileListFilter>,
        engine: TransferEngine,
        metrics: Metrics,
        events: EventBus,
        remote_directory: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            filter,
            comparator: None,
            engine,
            metrics,
            events,
            remote_directory: remote_directory.into(),
        }
    }

    /// Order listings with `comparator` before filtering.
    #[must_use]
    pub fn with_comparator(mut self, comparator: Arc<dyn ItemComparator>) -> Self {
        self.comparator = Some(comparator);
        self
    }

    /// Remote directory being synchronized.
    #[must_use]
    pub fn remote_directory(&self) -> &str {
        &self.remote_directory
    }

    /// Run one cycle into `local_directory`, transferring at most `max_fetch_size` items
    /// (negative means unlimited).
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Synchronize`] when listing or a transfer fails; unprocessed
    /// items are rolled back first.
    pub fn synchronize(
        &self,
        local_directory: &Path,
        max_fetch_size: i64,
    ) -> SyncResult<Vec<TransferredFile>> {
        if max_fetch_size == 0 {
            debug!(remote_directory = %self.remote_directory, "max fetch size is 0; skipping cycle");
            return Ok(Vec::new());
        }

        let listed = self
            .remote
            .list(&self.remote_directory)
            .map_err(|err| self.fail(err))?;
        let mut files: Vec<RemoteItem> = listed
            .into_iter()
            .filter(|item| {
                if !item.is_file {
                    debug!(path = %item.path(), "ignoring non-file entry");
                }
                item.is_file
            })
            .collect();
        if let Some(comparator) = &self.comparator {
            files.sort_by(|a, b| comparator.compare(a, b));
        }

        let mut selected = self.filter.filter(files);
        if let Ok(cap) = usize::try_from(max_fetch_size)
            && selected.len() > cap
        {
            let deferred = selected.split_off(cap);
            info!(
                remote_directory = %self.remote_directory,
                deferred = deferred.len(),
                max_fetch_size,
                "fetch size exceeded; deferring items to a later cycle"
            );
            self.roll_back(&deferred);
        }

        let mut transferred = Vec::with_capacity(selected.len());
        for (index, item) in selected.iter().enumerate() {
            match self.engine.transfer(item, local_directory) {
                Ok(TransferOutcome::Transferred(file)) => {
                    self.metrics.inc_sync_item("transferred");
                    transferred.push(file);
                }
                Ok(TransferOutcome::Skipped) => self.metrics.inc_sync_item("skipped"),
                Ok(TransferOutcome::Reverted) => self.metrics.inc_sync_item("reverted"),
                Err(err) => {
                    self.roll_back(&selected[index..]);
                    return Err(self.fail(err));
                }
            }
        }

        if !transferred.is_empty() {
            debug!(
                remote_directory = %self.remote_directory,
                count = transferred.len(),
                "synchronized items"
            );
            self.events.publish(Event::ItemsSynchronized {
                remote_directory: self.remote_directory.clone(),
                count: transferred.len(),
            });
        }
        Ok(transferred)
    }

    fn roll_back(&self, items: &[RemoteItem]) {
        if items.is_empty() || !self.filter.supports_rollback() {
            return;
        }
        self.filter.rollback(items);
        self.metrics
            .inc_sync_items("rolled_back", u64::try_from(items.len()).unwrap_or(u64::MAX));
    }

    fn fail(&self, err: SyncError) -> SyncError {
        error!(error = %err, remote_directory = %self.remote_directory, "synchronization failed");
        self.events.publish(Event::SyncFailed {
            remote_directory: self.remote_directory.clone(),
            message: err.to_string(),
        });
        SyncError::Synchronize {
            remote_directory: self.remote_directory.clone(),
            source: Box::new(err),
        }
    }
}
