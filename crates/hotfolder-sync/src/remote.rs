//! Remote storage capability and the filesystem-backed implementation.
//!
//! # Design
//! - Remote paths are `/`-separated strings relative to the remote root.
//! - Listings are one level deep and include directories flagged as non-files; callers
//!   decide what to discard.
//! - Every call is synchronous and blocks the calling thread.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;

use crate::error::{SyncError, SyncResult};

/// Separator used in remote paths.
pub const REMOTE_SEPARATOR: char = '/';

/// Snapshot of one remote entry taken at listing time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteItem {
    /// Entry name without the parent path.
    pub name: String,
    /// Parent directory as listed.
    pub parent: String,
    /// Size in bytes.
    pub size: u64,
    /// Last-modified time in milliseconds since the Unix epoch.
    pub modified: i64,
    /// Whether the entry is a file.
    pub is_file: bool,
}

impl RemoteItem {
    /// File entry with the given attributes.
    #[must_use]
    pub fn file(parent: impl Into<String>, name: impl Into<String>, size: u64, modified: i64) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            size,
            modified,
            is_file: true,
        }
    }

    /// Full remote path of the entry.
    #[must_use]
    pub fn path(&self) -> String {
        join_remote(&self.parent, &self.name)
    }
}

/// Join a remote directory and an entry name.
#[must_use]
pub fn join_remote(directory: &str, name: &str) -> String {
    let directory = directory.trim_end_matches(REMOTE_SEPARATOR);
    if directory.is_empty() {
        name.to_string()
    } else {
        format!("{directory}{REMOTE_SEPARATOR}{name}")
    }
}

/// Blob-store primitives consumed by the synchronizer.
pub trait RemoteStorage: Send + Sync {
    /// List the entries directly under `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the listing fails.
    fn list(&self, path: &str) -> SyncResult<Vec<RemoteItem>>;

    /// Stream the content of `path` into `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error when the item cannot be read or the sink rejects the data.
    fn read(&self, path: &str, sink: &mut dyn Write) -> SyncResult<()>;

    /// Create or overwrite `path` with the content of `source`.
    ///
    /// # Errors
    ///
    /// Returns an error when the item cannot be written.
    fn write(&self, path: &str, source: &mut dyn Read) -> SyncResult<()>;

    /// Move `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error when the rename fails.
    fn rename(&self, from: &str, to: &str) -> SyncResult<()>;

    /// Remove `path`, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error when the item exists but cannot be removed.
    fn remove(&self, path: &str) -> SyncResult<bool>;

    /// Whether `path` exists.
    ///
    /// # Errors
    ///
    /// Returns an error when existence cannot be determined.
    fn exists(&self, path: &str) -> SyncResult<bool>;
}

/// Remote storage over a local directory tree.
#[derive(Debug, Clone)]
pub struct FsRemote {
    root: PathBuf,
}

impl FsRemote {
    /// Remote rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> SyncResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches(REMOTE_SEPARATOR));
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir))
        {
            return Err(SyncError::InvalidRemotePath {
                path: path.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

fn modified_millis(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
        .and_then(|since| i64::try_from(since.as_millis()).ok())
        .unwrap_or_default()
}

fn ensure_parent(target: &Path, path: &str) -> SyncResult<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|source| SyncError::remote("remote.create_parent", path, source))?;
    }
    Ok(())
}

impl RemoteStorage for FsRemote {
    fn list(&self, path: &str) -> SyncResult<Vec<RemoteItem>> {
        let directory = self.resolve(path)?;
        let mut items = Vec::new();
        for entry in WalkDir::new(&directory).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|source| SyncError::Walk {
                path: path.to_string(),
                source,
            })?;
            let metadata = entry.metadata().map_err(|source| SyncError::Walk {
                path: path.to_string(),
                source,
            })?;
            items.push(RemoteItem {
                name: entry.file_name().to_string_lossy().into_owned(),
                parent: path.to_string(),
                size: metadata.len(),
                modified: modified_millis(&metadata),
                is_file: metadata.is_file(),
            });
        }
        Ok(items)
    }

    fn read(&self, path: &str, sink: &mut dyn Write) -> SyncResult<()> {
        let file = File::open(self.resolve(path)?)
            .map_err(|source| SyncError::remote("remote.open", path, source))?;
        io::copy(&mut BufReader::new(file), sink)
            .map_err(|source| SyncError::remote("remote.read", path, source))?;
        Ok(())
    }

    fn write(&self, path: &str, source: &mut dyn Read) -> SyncResult<()> {
        let target = self.resolve(path)?;
        ensure_parent(&target, path)?;
        let file = File::create(&target)
            .map_err(|err| SyncError::remote("remote.create", path, err))?;
        let mut writer = BufWriter::new(file);
        io::copy(source, &mut writer)
            .and_then(|_| writer.flush())
            .map_err(|err| SyncError::remote("remote.write", path, err))
    }

    fn rename(&self, from: &str, to: &str) -> SyncResult<()> {
        let source_path = self.resolve(from)?;
        let target = self.resolve(to)?;
        ensure_parent(&target, to)?;
        fs::rename(&source_path, &target)
            .map_err(|source| SyncError::remote("remote.rename", from, source))
    }

    fn remove(&self, path: &str) -> SyncResult<bool> {
        match fs::remove_file(self.resolve(path)?) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SyncError::remote("remote.remove", path, source)),
        }
    }

    fn exists(&self, path: &str) -> SyncResult<bool> {
        self.resolve(path)?
            .try_exists()
            .map_err(|source| SyncError::remote("remote.exists", path, source))
    }
}
