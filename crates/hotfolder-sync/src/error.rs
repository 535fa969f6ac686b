//! # Design
//!
//! - Local filesystem and remote storage failures are separate variants; both keep the
//!   operation and path as fields and the IO error as `source`.
//! - A failed cycle is wrapped once at the synchronizer boundary with the remote directory.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised while listing, selecting, or transferring remote items.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local filesystem failure.
    #[error("local filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Local path involved.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Remote storage failure.
    #[error("remote storage operation failed")]
    Remote {
        /// Operation identifier.
        operation: &'static str,
        /// Remote path involved.
        path: String,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Directory traversal failure in the filesystem remote.
    #[error("remote directory walk failed")]
    Walk {
        /// Remote path being listed.
        path: String,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// A remote path escapes the remote root.
    #[error("remote path rejected")]
    InvalidRemotePath {
        /// Offending path.
        path: String,
    },
    /// The local directory is unusable.
    #[error("local directory unavailable")]
    LocalDirectory {
        /// Local directory.
        path: PathBuf,
        /// Static reason.
        reason: &'static str,
    },
    /// A comparator or filter pattern failed to compile.
    #[error("invalid pattern")]
    Pattern {
        /// Pattern text.
        pattern: String,
        /// Underlying regex error.
        source: Box<regex::Error>,
    },
    /// `receive` was called on a stopped source.
    #[error("synchronizing source is not running")]
    NotRunning,
    /// A synchronization cycle failed after rolling back unprocessed items.
    #[error("synchronization cycle failed")]
    Synchronize {
        /// Remote directory being synchronized.
        remote_directory: String,
        /// Failure that aborted the cycle.
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Remote failure helper, also used by remote storage implementations outside this crate.
    pub fn remote(operation: &'static str, path: impl Into<String>, source: io::Error) -> Self {
        Self::Remote {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn pattern(pattern: &str, source: regex::Error) -> Self {
        Self::Pattern {
            pattern: pattern.to_string(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn helpers_keep_context_out_of_messages() {
        let err = SyncError::remote("remote.read", "inbound/a.csv", io::Error::other("reset"));
        assert_eq!(err.to_string(), "remote storage operation failed");
        assert!(err.source().is_some());

        let wrapped = SyncError::Synchronize {
            remote_directory: "inbound".into(),
            source: Box::new(err),
        };
        assert_eq!(wrapped.to_string(), "synchronization cycle failed");
        assert!(wrapped.source().is_some());

        let local = SyncError::io("transfer.rename", "/tmp/a", io::Error::other("busy"));
        assert!(matches!(local, SyncError::Io { operation: "transfer.rename", .. }));
    }
}
