//! Per-item transfer: temp-file download, atomic rename, and remote disposition.
//!
//! # Design
//! - Content lands in `<local><suffix>` first and is renamed into place, so readers of the
//!   local directory never observe a partial file.
//! - A rename that still fails after clearing the target is not an error: the item is
//!   reverted in the filter and retried next cycle.
//! - Read failures propagate so the synchronizer can roll back the rest of the batch.
//! - Each read opens a history keyed by name plus last-modified time and checkpoints it
//!   for the routing stage.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hotfolder_monitor::{MonitorService, Status, Step, SystemArea};
use hotfolder_store::Clock;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::filter::FileListFilter;
use crate::naming::LocalNameGenerator;
use crate::remote::{RemoteItem, RemoteStorage, join_remote};

/// Default suffix of in-flight local files.
pub const DEFAULT_TEMPORARY_SUFFIX: &str = ".writing";

/// What happens to the remote item after a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RemoteDisposition {
    /// Leave the remote item in place.
    #[default]
    Keep,
    /// Move the remote item into the given remote directory.
    MoveTo(String),
    /// Delete the remote item.
    Delete,
}

impl RemoteDisposition {
    /// Disposition from the two configuration toggles; a move target wins over delete.
    #[must_use]
    pub fn from_settings(move_to: Option<&str>, delete: bool) -> Self {
        match move_to.map(str::trim).filter(|dir| !dir.is_empty()) {
            Some(dir) => Self::MoveTo(dir.to_string()),
            None if delete => Self::Delete,
            None => Self::Keep,
        }
    }
}

/// Transfer behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Suffix of the temp file written before the rename.
    pub temporary_suffix: String,
    /// Remote disposition after transfer.
    pub disposition: RemoteDisposition,
    /// Copy the remote last-modified time onto the local file.
    pub preserve_timestamp: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            temporary_suffix: DEFAULT_TEMPORARY_SUFFIX.to_string(),
            disposition: RemoteDisposition::Keep,
            preserve_timestamp: false,
        }
    }
}

/// A file now present in the local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferredFile {
    /// Final local path.
    pub local_path: PathBuf,
    /// Remote directory the item now lives in.
    pub remote_directory: String,
    /// Whether the remote item was deleted.
    pub deleted: bool,
    /// Remote snapshot the file was transferred from.
    pub remote: RemoteItem,
}

/// Result of transferring one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The item was downloaded.
    Transferred(TransferredFile),
    /// Nothing was done: not a file, or an up-to-date local copy exists.
    Skipped,
    /// The download could not be put in place; the filter was reverted for a retry.
    Reverted,
}

/// Moves single remote items into the local directory.
pub struct TransferEngine {
    remote: Arc<dyn RemoteStorage>,
    filter: Arc<dyn FileListFilter>,
    names: Arc<dyn LocalNameGenerator>,
    clock: Arc<dyn Clock>,
    monitor: Option<MonitorService>,
    settings: TransferSettings,
}

impl std::fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferEngine")
            .field("names", &self.names)
            .field("settings", &self.settings)
            .field("monitored", &self.monitor.is_some())
            .finish_non_exhaustive()
    }
}

impl TransferEngine {
    /// Engine reading from `remote` and reverting through `filter`.
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteStorage>,
        filter: Arc<dyn FileListFilter>,
        names: Arc<dyn LocalNameGenerator>,
        clock: Arc<dyn Clock>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            remote,
            filter,
            names,
            clock,
            monitor: None,
            settings,
        }
    }

    /// Record a history for every read.
    #[must_use]
    pub fn with_monitor(mut self, monitor: MonitorService) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Transfer `item` into `local_directory`.
    ///
    /// # Errors
    ///
    /// Returns an error when the remote read, the local write, the remote disposition, or
    /// timestamp preservation fails.
    pub fn transfer(&self, item: &RemoteItem, local_directory: &Path) -> SyncResult<TransferOutcome> {
        let remote_path = item.path();
        if !item.is_file {
            debug!(path = %remote_path, "cannot copy, not a file");
            return Ok(TransferOutcome::Skipped);
        }

        let local_name = self.names.local_name(&item.name);
        let local_path = local_directory.join(&local_name);
        let exists = local_path.exists();
        if exists && !(self.settings.preserve_timestamp && local_modified(&local_path) != Some(item.modified)) {
            warn!(
                path = %remote_path,
                local = %local_path.display(),
                "remote file not transferred over existing local file; consider removing the local file"
            );
            return Ok(TransferOutcome::Skipped);
        }

        if !exists && let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| SyncError::io("transfer.create_parent", parent, source))?;
        }

        let mut transfer = true;
        if exists && let Err(err) = fs::remove_file(&local_path) {
            info!(
                error = %err,
                local = %local_path.display(),
                "cannot delete local file to transfer modified remote file; it may be busy"
            );
            transfer = false;
        }

        let renamed = transfer && self.download(item, &remote_path, &local_path)?;
        if !renamed {
            if self.filter.supports_rollback() {
                info!(path = %remote_path, "reverting remote file in the filter for a later attempt");
                self.filter.remove(item);
                return Ok(TransferOutcome::Reverted);
            }
            return Ok(TransferOutcome::Skipped);
        }

        let file = self.dispose(item, &remote_path, local_path)?;
        if self.settings.preserve_timestamp {
            set_local_modified(&file.local_path, item.modified)?;
        }
        Ok(TransferOutcome::Transferred(file))
    }

    fn dispose(&self, item: &RemoteItem, remote_path: &str, local_path: PathBuf) -> SyncResult<TransferredFile> {
        let mut file = TransferredFile {
            local_path,
            remote_directory: item.parent.clone(),
            deleted: false,
            remote: item.clone(),
        };
        match &self.settings.disposition {
            RemoteDisposition::MoveTo(directory) => {
                let target = join_remote(directory, &item.name);
                self.remote.rename(remote_path, &target)?;
                debug!(from = %remote_path, to = %target, "moved remote file");
                file.remote_directory.clone_from(directory);
            }
            RemoteDisposition::Delete => {
                self.remote.remove(remote_path)?;
                debug!(path = %remote_path, "deleted remote file");
                file.deleted = true;
            }
            RemoteDisposition::Keep => {}
        }
        Ok(file)
    }

    /// Read into the temp file and rename it into place; `false` when the rename gave up.
    fn download(&self, item: &RemoteItem, remote_path: &str, local_path: &Path) -> SyncResult<bool> {
        let mut temp = local_path.as_os_str().to_owned();
        temp.push(&self.settings.temporary_suffix);
        let temp = PathBuf::from(temp);

        let mut history = self
            .monitor
            .as_ref()
            .map(|monitor| monitor.begin(SystemArea::HotFolder, format!("{}{}", item.name, item.modified)));
        let started = self.clock.now();
        match self.read_to(remote_path, &temp) {
            Ok(()) => {
                if let Some(mut history) = history.take() {
                    history.step_succeeded(
                        Step::Downloaded,
                        Some(started),
                        Some(self.clock.now()),
                        format!(
                            "Successfully read blob [{remote_path}] of size [{}]",
                            display_size(item.size)
                        ),
                    );
                    history.checkpoint();
                }
            }
            Err(err) => {
                if let Some(mut history) = history.take() {
                    history.step_failed(
                        Step::Downloaded,
                        Some(started),
                        Some(self.clock.now()),
                        Some(&err as &(dyn std::error::Error + 'static)),
                        format!("Failed to read blob [{remote_path}]"),
                    );
                    history.end(Status::Failure);
                }
                discard_temp(&temp);
                return Err(err);
            }
        }

        if fs::rename(&temp, local_path).is_ok() {
            return Ok(true);
        }
        if let Err(err) = fs::remove_file(local_path) {
            info!(
                error = %err,
                local = %local_path.display(),
                "cannot delete local file before retrying rename; it may be busy"
            );
            discard_temp(&temp);
            return Ok(false);
        }
        if let Err(err) = fs::rename(&temp, local_path) {
            info!(
                error = %err,
                temp = %temp.display(),
                local = %local_path.display(),
                "cannot rename temp file after deleting local file; it may be busy"
            );
            discard_temp(&temp);
            return Ok(false);
        }
        Ok(true)
    }

    fn read_to(&self, remote_path: &str, temp: &Path) -> SyncResult<()> {
        let file = File::create(temp).map_err(|source| SyncError::io("transfer.create_temp", temp, source))?;
        let mut writer = BufWriter::new(file);
        self.remote.read(remote_path, &mut writer)?;
        writer
            .flush()
            .map_err(|source| SyncError::io("transfer.flush_temp", temp, source))
    }
}

fn local_modified(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    i64::try_from(modified.duration_since(UNIX_EPOCH).ok()?.as_millis()).ok()
}

fn set_local_modified(path: &Path, millis: i64) -> SyncResult<()> {
    let at = u64::try_from(millis)
        .ok()
        .and_then(|millis| UNIX_EPOCH.checked_add(Duration::from_millis(millis)))
        .unwrap_or(SystemTime::UNIX_EPOCH);
    File::options()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(at))
        .map_err(|source| SyncError::io("transfer.preserve_timestamp", path, source))
}

fn display_size(bytes: u64) -> String {
    const UNITS: [(u64, &str); 3] = [(1 << 30, "GB"), (1 << 20, "MB"), (1 << 10, "KB")];
    UNITS
        .iter()
        .find(|(scale, _)| bytes >= *scale)
        .map_or_else(|| format!("{bytes} bytes"), |(scale, unit)| format!("{} {unit}", bytes / scale))
}

fn discard_temp(temp: &Path) {
    if let Err(err) = fs::remove_file(temp) {
        debug!(error = %err, temp = %temp.display(), "temp file not removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AcceptOnceFilter;
    use crate::naming::RemoteNames;
    use crate::remote::FsRemote;
    use anyhow::Result;
    use chrono::{DateTime, Utc};
    use hotfolder_coord::ExpiringMetadataStore;
    use hotfolder_monitor::{FreshRestorer, HistoryData, MonitorRecorder};
    use hotfolder_store::ManualClock;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Captured {
        seen: Mutex<Vec<HistoryData>>,
    }

    impl Captured {
        fn histories(&self) -> Vec<HistoryData> {
            self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
        }
    }

    impl MonitorRecorder for Captured {
        fn name(&self) -> &'static str {
            "captured"
        }

        fn record(&self, history: &mut HistoryData) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(history.clone());
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        remote: Arc<FsRemote>,
        local: PathBuf,
        filter: Arc<AcceptOnceFilter>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            let dir = tempfile::Builder::new().prefix("hotfolder-transfer-").tempdir()?;
            let local = dir.path().join("local");
            fs::create_dir_all(&local)?;
            let clock = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
            Ok(Self {
                remote: Arc::new(FsRemote::new(dir.path().join("remote"))),
                filter: Arc::new(AcceptOnceFilter::new(
                    Arc::new(ExpiringMetadataStore::new(100, Duration::from_secs(600), clock.clone())),
                    "p:",
                )),
                local,
                clock,
                _dir: dir,
            })
        }

        fn engine(&self, settings: TransferSettings) -> TransferEngine {
            TransferEngine::new(
                self.remote.clone(),
                self.filter.clone(),
                Arc::new(RemoteNames),
                self.clock.clone(),
                settings,
            )
        }

        fn put(&self, name: &str, content: &str) -> Result<RemoteItem> {
            let path = join_remote("inbound", name);
            self.remote.write(&path, &mut content.as_bytes())?;
            Ok(RemoteItem::file("inbound", name, content.len() as u64, 1_700_000_000_000))
        }
    }

    #[test]
    fn transfer_writes_local_file_and_moves_remote() -> Result<()> {
        let fixture = Fixture::new()?;
        let item = fixture.put("a.csv", "a,b")?;
        let capture = Arc::new(Captured::default());
        let engine = fixture
            .engine(TransferSettings {
                disposition: RemoteDisposition::MoveTo("done".into()),
                ..TransferSettings::default()
            })
            .with_monitor(MonitorService::new(capture.clone(), Arc::new(FreshRestorer), 1));

        let TransferOutcome::Transferred(file) = engine.transfer(&item, &fixture.local)? else {
            anyhow::bail!("expected a transfer");
        };
        assert_eq!(fs::read_to_string(&file.local_path)?, "a,b");
        assert_eq!(file.remote_directory, "done");
        assert!(!file.deleted);
        assert!(fixture.remote.exists("done/a.csv")?);
        assert!(!fixture.remote.exists("inbound/a.csv")?);
        assert!(!fixture.local.join("a.csv.writing").exists());

        let histories = capture.histories();
        assert_eq!(histories.len(), 1);
        assert_eq!(histories[0].key, "a.csv1700000000000");
        assert_eq!(histories[0].status, Status::InProgress);
        assert_eq!(histories[0].entries[0].step, Step::Downloaded);
        assert!(histories[0].entries[0].message.ends_with("of size [3 bytes]"));
        Ok(())
    }

    #[test]
    fn existing_local_file_is_skipped_unless_timestamps_differ() -> Result<()> {
        let fixture = Fixture::new()?;
        let item = fixture.put("a.csv", "new")?;
        fs::write(fixture.local.join("a.csv"), "old")?;

        let plain = fixture.engine(TransferSettings::default());
        assert_eq!(plain.transfer(&item, &fixture.local)?, TransferOutcome::Skipped);
        assert_eq!(fs::read_to_string(fixture.local.join("a.csv"))?, "old");

        let preserving = fixture.engine(TransferSettings {
            preserve_timestamp: true,
            disposition: RemoteDisposition::Delete,
            ..TransferSettings::default()
        });
        let TransferOutcome::Transferred(file) = preserving.transfer(&item, &fixture.local)? else {
            anyhow::bail!("expected a transfer");
        };
        assert!(file.deleted);
        assert_eq!(fs::read_to_string(&file.local_path)?, "new");
        assert_eq!(local_modified(&file.local_path), Some(item.modified));
        assert!(!fixture.remote.exists("inbound/a.csv")?);

        let again = fixture.put("a.csv", "newer")?;
        assert_eq!(preserving.transfer(&again, &fixture.local)?, TransferOutcome::Skipped);
        Ok(())
    }

    #[test]
    fn busy_local_target_reverts_filter() -> Result<()> {
        let fixture = Fixture::new()?;
        let item = fixture.put("a.csv", "x")?;
        assert!(fixture.filter.accept(&item));
        fs::create_dir_all(fixture.local.join("a.csv").join("occupied"))?;

        let engine = fixture.engine(TransferSettings {
            preserve_timestamp: true,
            ..TransferSettings::default()
        });
        assert_eq!(engine.transfer(&item, &fixture.local)?, TransferOutcome::Reverted);
        assert!(fixture.filter.accept(&item));
        assert!(fixture.remote.exists("inbound/a.csv")?);
        Ok(())
    }

    /// Filesystem remote that occupies the local target while the item is being read.
    struct OccupyingRemote {
        inner: Arc<FsRemote>,
        target: PathBuf,
    }

    impl RemoteStorage for OccupyingRemote {
        fn list(&self, path: &str) -> SyncResult<Vec<RemoteItem>> {
            self.inner.list(path)
        }

        fn read(&self, path: &str, sink: &mut dyn Write) -> SyncResult<()> {
            self.inner.read(path, sink)?;
            let occupied = self.target.join("occupied");
            fs::create_dir_all(&occupied)
                .map_err(|source| SyncError::io("test.occupy", occupied, source))
        }

        fn write(&self, path: &str, source: &mut dyn std::io::Read) -> SyncResult<()> {
            self.inner.write(path, source)
        }

        fn rename(&self, from: &str, to: &str) -> SyncResult<()> {
            self.inner.rename(from, to)
        }

        fn remove(&self, path: &str) -> SyncResult<bool> {
            self.inner.remove(path)
        }

        fn exists(&self, path: &str) -> SyncResult<bool> {
            self.inner.exists(path)
        }
    }

    #[test]
    fn failed_rename_reverts_and_discards_temp_file() -> Result<()> {
        let fixture = Fixture::new()?;
        let item = fixture.put("a.csv", "x")?;
        assert!(fixture.filter.accept(&item));
        let target = fixture.local.join("a.csv");
        let engine = TransferEngine::new(
            Arc::new(OccupyingRemote {
                inner: fixture.remote.clone(),
                target: target.clone(),
            }),
            fixture.filter.clone(),
            Arc::new(RemoteNames),
            fixture.clock.clone(),
            TransferSettings::default(),
        );

        assert_eq!(engine.transfer(&item, &fixture.local)?, TransferOutcome::Reverted);
        assert!(target.is_dir());
        assert!(!fixture.local.join("a.csv.writing").exists());
        assert!(fixture.filter.accept(&item));
        assert!(fixture.remote.exists("inbound/a.csv")?);
        Ok(())
    }

    #[test]
    fn read_failure_ends_history_as_failure_and_propagates() -> Result<()> {
        let fixture = Fixture::new()?;
        let item = RemoteItem::file("inbound", "ghost.csv", 1, 5);
        let capture = Arc::new(Captured::default());
        let engine = fixture
            .engine(TransferSettings::default())
            .with_monitor(MonitorService::new(capture.clone(), Arc::new(FreshRestorer), 1));

        assert!(matches!(
            engine.transfer(&item, &fixture.local),
            Err(SyncError::Remote { operation: "remote.open", .. })
        ));
        assert!(!fixture.local.join("ghost.csv.writing").exists());
        let histories = capture.histories();
        assert_eq!(histories[0].status, Status::Failure);
        assert_eq!(histories[0].entries[0].status, Status::Failure);
        assert!(histories[0].exception_message.is_some());
        Ok(())
    }

    #[test]
    fn sizes_render_in_largest_whole_unit() {
        assert_eq!(display_size(12), "12 bytes");
        assert_eq!(display_size(2_048), "2 KB");
        assert_eq!(display_size(5 << 20), "5 MB");
        assert_eq!(
            RemoteDisposition::from_settings(Some("done"), true),
            RemoteDisposition::MoveTo("done".into())
        );
        assert_eq!(RemoteDisposition::from_settings(Some(" "), true), RemoteDisposition::Delete);
        assert_eq!(RemoteDisposition::from_settings(None, false), RemoteDisposition::Keep);
    }
}
