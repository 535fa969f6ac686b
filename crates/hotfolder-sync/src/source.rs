//! Pull-style source yielding transferred files one at a time.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use hotfolder_coord::{CoordResult, Lifecycle};
use tracing::{error, info};

use crate::error::{SyncError, SyncResult};
use crate::synchronizer::Synchronizer;
use crate::transfer::TransferredFile;

const SOURCE_NAME: &str = "synchronizing-source";

/// Buffers the output of synchronization cycles and hands it out on demand.
#[derive(Debug)]
pub struct SynchronizingSource {
    synchronizer: Synchronizer,
    local_directory: PathBuf,
    max_fetch_size: i64,
    queue: Mutex<VecDeque<TransferredFile>>,
    running: AtomicBool,
}

impl SynchronizingSource {
    /// Source writing into `local_directory`, creating it when `auto_create` is set.
    ///
    /// # Errors
    ///
    /// Returns an error when the local directory is missing and may not be created, cannot
    /// be created, or is not a directory.
    pub fn new(
        synchronizer: Synchronizer,
        local_directory: impl Into<PathBuf>,
        auto_create: bool,
        max_fetch_size: i64,
    ) -> SyncResult<Self> {
        let local_directory = local_directory.into();
        prepare_local_directory(&local_directory, auto_create)?;
        Ok(Self {
            synchronizer,
            local_directory,
            max_fetch_size,
            queue: Mutex::new(VecDeque::new()),
            running: AtomicBool::new(false),
        })
    }

    /// Local directory files are written to.
    #[must_use]
    pub fn local_directory(&self) -> &Path {
        &self.local_directory
    }

    /// Next transferred file, running a cycle when nothing is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotRunning`] when stopped, or the cycle failure.
    pub fn receive(&self) -> SyncResult<Option<TransferredFile>> {
        if !self.is_running() {
            return Err(SyncError::NotRunning);
        }
        let mut queue = self.lock_queue();
        if queue.is_empty() {
            queue.extend(
                self.synchronizer
                    .synchronize(&self.local_directory, self.max_fetch_size)?,
            );
        }
        Ok(queue.pop_front())
    }

    /// Number of buffered files.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock_queue().len()
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<TransferredFile>> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("source queue mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

fn prepare_local_directory(path: &Path, auto_create: bool) -> SyncResult<()> {
    if !path.exists() {
        if !auto_create {
            return Err(SyncError::LocalDirectory {
                path: path.to_path_buf(),
                reason: "missing",
            });
        }
        fs::create_dir_all(path)
            .map_err(|source| SyncError::io("source.create_local_directory", path, source))?;
        info!(path = %path.display(), "created local directory");
    }
    if !path.is_dir() {
        return Err(SyncError::LocalDirectory {
            path: path.to_path_buf(),
            reason: "not_a_directory",
        });
    }
    Ok(())
}

impl Lifecycle for SynchronizingSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn start(&self) -> CoordResult<()> {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!(
                remote_directory = %self.synchronizer.remote_directory(),
                local = %self.local_directory.display(),
                "synchronizing source started"
            );
        }
        Ok(())
    }

    fn stop(&self) -> CoordResult<()> {
        if self.running.swap(false, Ordering::SeqCst) {
            info!(
                remote_directory = %self.synchronizer.remote_directory(),
                "synchronizing source stopped"
            );
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AcceptOnceFilter;
    use crate::naming::RemoteNames;
    use crate::remote::{FsRemote, RemoteStorage};
    use crate::transfer::{TransferEngine, TransferSettings};
    use anyhow::Result;
    use chrono::{DateTime, Utc};
    use hotfolder_coord::ExpiringMetadataStore;
    use hotfolder_events::EventBus;
    use hotfolder_store::ManualClock;
    use hotfolder_telemetry::Metrics;
    use std::sync::Arc;
    use std::time::Duration;

    fn synchronizer(root: &Path) -> Result<(Arc<FsRemote>, Synchronizer)> {
        let remote = Arc::new(FsRemote::new(root.join("remote")));
        let clock = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
        let filter = Arc::new(AcceptOnceFilter::new(
            Arc::new(ExpiringMetadataStore::new(10, Duration::from_secs(60), clock.clone())),
            "p:",
        ));
        let engine = TransferEngine::new(
            remote.clone(),
            filter.clone(),
            Arc::new(RemoteNames),
            clock,
            TransferSettings::default(),
        );
        let synchronizer = Synchronizer::new(
            remote.clone(),
            filter,
            engine,
            Metrics::new()?,
            EventBus::new(),
            "inbound",
        );
        Ok((remote, synchronizer))
    }

    #[test]
    fn missing_local_directory_requires_auto_create() -> Result<()> {
        let dir = tempfile::Builder::new().prefix("hotfolder-source-").tempdir()?;
        let (_, sync) = synchronizer(dir.path())?;
        let missing = dir.path().join("local");
        assert!(matches!(
            SynchronizingSource::new(sync, &missing, false, -1),
            Err(SyncError::LocalDirectory { reason: "missing", .. })
        ));

        let file = dir.path().join("plain");
        fs::write(&file, "x")?;
        let (_, sync) = synchronizer(dir.path())?;
        assert!(matches!(
            SynchronizingSource::new(sync, &file, true, -1),
            Err(SyncError::LocalDirectory { reason: "not_a_directory", .. })
        ));

        let (_, sync) = synchronizer(dir.path())?;
        let source = SynchronizingSource::new(sync, &missing, true, -1)?;
        assert!(source.local_directory().is_dir());
        Ok(())
    }

    #[test]
    fn receive_buffers_a_cycle_and_requires_running() -> Result<()> {
        let dir = tempfile::Builder::new().prefix("hotfolder-source-").tempdir()?;
        let (remote, sync) = synchronizer(dir.path())?;
        remote.write("inbound/a.csv", &mut "a".as_bytes())?;
        remote.write("inbound/b.csv", &mut "b".as_bytes())?;
        let source = SynchronizingSource::new(sync, dir.path().join("local"), true, -1)?;

        assert!(matches!(source.receive(), Err(SyncError::NotRunning)));
        source.start()?;
        assert_eq!(source.name(), "synchronizing-source");

        let first = source.receive()?.map(|file| file.remote.name);
        assert_eq!(first.as_deref(), Some("a.csv"));
        assert_eq!(source.pending(), 1);
        let second = source.receive()?.map(|file| file.remote.name);
        assert_eq!(second.as_deref(), Some("b.csv"));
        assert!(source.receive()?.is_none());

        source.stop()?;
        assert!(!source.is_running());
        Ok(())
    }
}
