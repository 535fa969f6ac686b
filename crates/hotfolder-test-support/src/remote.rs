//! In-memory remote storage with per-path fault injection.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use hotfolder_sync::{REMOTE_SEPARATOR, RemoteItem, RemoteStorage, SyncError, SyncResult};
use tracing::error;

#[derive(Debug, Clone)]
struct Blob {
    content: Vec<u8>,
    modified: i64,
}

#[derive(Debug, Default)]
struct State {
    blobs: BTreeMap<String, Blob>,
    failing_reads: HashSet<String>,
}

/// Remote storage kept in a map of path to content.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
    fail_renames: AtomicBool,
    reads: AtomicUsize,
    lists: AtomicUsize,
}

fn normalize(path: &str) -> &str {
    path.trim_matches(REMOTE_SEPARATOR)
}

impl MemoryRemote {
    /// Empty remote.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `content` at `path` with the given last-modified time.
    pub fn put(&self, path: &str, content: impl Into<Vec<u8>>, modified: i64) {
        self.lock().blobs.insert(
            normalize(path).to_string(),
            Blob {
                content: content.into(),
                modified,
            },
        );
    }

    /// Content stored at `path`.
    #[must_use]
    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .blobs
            .get(normalize(path))
            .map(|blob| blob.content.clone())
    }

    /// Make reads of `path` fail.
    pub fn fail_reads_of(&self, path: &str) {
        self.lock().failing_reads.insert(normalize(path).to_string());
    }

    /// Make every rename fail while `enabled`.
    pub fn fail_renames(&self, enabled: bool) {
        self.fail_renames.store(enabled, Ordering::SeqCst);
    }

    /// Number of `read` calls so far.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `list` calls so far.
    #[must_use]
    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("memory remote mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

fn not_found(operation: &'static str, path: &str) -> SyncError {
    SyncError::remote(
        operation,
        path,
        io::Error::new(io::ErrorKind::NotFound, "no such blob"),
    )
}

impl RemoteStorage for MemoryRemote {
    fn list(&self, path: &str) -> SyncResult<Vec<RemoteItem>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let directory = normalize(path);
        let state = self.lock();
        let mut files = Vec::new();
        let mut directories = BTreeSet::new();
        for (key, blob) in &state.blobs {
            let relative = if directory.is_empty() {
                Some(key.as_str())
            } else {
                key.strip_prefix(directory)
                    .and_then(|rest| rest.strip_prefix(REMOTE_SEPARATOR))
            };
            let Some(relative) = relative else {
                continue;
            };
            match relative.split_once(REMOTE_SEPARATOR) {
                Some((child, _)) => {
                    directories.insert(child.to_string());
                }
                None => files.push(RemoteItem::file(
                    path,
                    relative,
                    u64::try_from(blob.content.len()).unwrap_or(u64::MAX),
                    blob.modified,
                )),
            }
        }
        drop(state);
        files.extend(directories.into_iter().map(|name| RemoteItem {
            name,
            parent: path.to_string(),
            size: 0,
            modified: 0,
            is_file: false,
        }));
        Ok(files)
    }

    fn read(&self, path: &str, sink: &mut dyn Write) -> SyncResult<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let key = normalize(path);
        let content = {
            let state = self.lock();
            if state.failing_reads.contains(key) {
                return Err(SyncError::remote(
                    "memory.read",
                    path,
                    io::Error::new(io::ErrorKind::ConnectionReset, "injected read failure"),
                ));
            }
            state
                .blobs
                .get(key)
                .map(|blob| blob.content.clone())
                .ok_or_else(|| not_found("memory.read", path))?
        };
        sink.write_all(&content)
            .map_err(|source| SyncError::remote("memory.read", path, source))
    }

    fn write(&self, path: &str, source: &mut dyn Read) -> SyncResult<()> {
        let mut content = Vec::new();
        source
            .read_to_end(&mut content)
            .map_err(|err| SyncError::remote("memory.write", path, err))?;
        self.put(path, content, 0);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> SyncResult<()> {
        if self.fail_renames.load(Ordering::SeqCst) {
            return Err(SyncError::remote(
                "memory.rename",
                from,
                io::Error::new(io::ErrorKind::PermissionDenied, "injected rename failure"),
            ));
        }
        let mut state = self.lock();
        let blob = state
            .blobs
            .remove(normalize(from))
            .ok_or_else(|| not_found("memory.rename", from))?;
        state.blobs.insert(normalize(to).to_string(), blob);
        Ok(())
    }

    fn remove(&self, path: &str) -> SyncResult<bool> {
        Ok(self.lock().blobs.remove(normalize(path)).is_some())
    }

    fn exists(&self, path: &str) -> SyncResult<bool> {
        Ok(self.lock().blobs.contains_key(normalize(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn list_reports_files_then_child_directories() -> Result<()> {
        let remote = MemoryRemote::new();
        remote.put("inbound/b.csv", "bb", 2);
        remote.put("inbound/a.csv", "a", 1);
        remote.put("inbound/archive/old.csv", "o", 0);
        remote.put("other/c.csv", "c", 0);

        let items = remote.list("inbound")?;
        let names: Vec<_> = items.iter().map(|item| (item.name.as_str(), item.is_file)).collect();
        assert_eq!(names, vec![("a.csv", true), ("b.csv", true), ("archive", false)]);
        assert_eq!(items[1].size, 2);
        assert_eq!(items[1].path(), "inbound/b.csv");
        assert_eq!(remote.list_count(), 1);
        Ok(())
    }

    #[test]
    fn injected_faults_surface_as_remote_errors() -> Result<()> {
        let remote = MemoryRemote::new();
        remote.put("inbound/a.csv", "a", 1);
        remote.fail_reads_of("inbound/a.csv");
        assert!(matches!(
            remote.read("inbound/a.csv", &mut Vec::new()),
            Err(SyncError::Remote { operation: "memory.read", .. })
        ));
        assert_eq!(remote.read_count(), 1);

        remote.fail_renames(true);
        assert!(remote.rename("inbound/a.csv", "done/a.csv").is_err());
        remote.fail_renames(false);
        remote.rename("inbound/a.csv", "done/a.csv")?;
        assert_eq!(remote.content("done/a.csv"), Some(b"a".to_vec()));
        assert!(!remote.exists("inbound/a.csv")?);
        Ok(())
    }
}
