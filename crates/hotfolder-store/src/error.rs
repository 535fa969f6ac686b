//! # Design
//!
//! - Constant error messages with structured context fields.
//! - Uniqueness violations are a distinct variant so callers can treat a lost race as data.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by record store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A create or save would produce two rows with the same unique key.
    #[error("unique constraint violated")]
    UniqueViolation {
        /// Table the violation occurred in.
        table: &'static str,
        /// Unique key that collided.
        unique_key: String,
    },
    /// The row being saved no longer exists.
    #[error("record not found")]
    NotFound {
        /// Table that was searched.
        table: &'static str,
        /// Identifier of the missing row.
        id: u64,
    },
    /// IO failures while reading or writing a table file.
    #[error("store io failure")]
    Io {
        /// Table operation that touched the disk.
        operation: &'static str,
        /// Backing file or directory.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// JSON encoding failures for a table file.
    #[error("store json failure")]
    Json {
        /// Table operation that (de)serialized rows.
        operation: &'static str,
        /// Backing file holding the rows.
        path: PathBuf,
        /// Codec error from `serde_json`.
        source: serde_json::Error,
    },
    /// The backing store refused the operation.
    #[error("store unavailable")]
    Unavailable {
        /// Operation that was refused.
        operation: &'static str,
    },
}

impl StoreError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Returns `true` when the error is a uniqueness violation.
    #[must_use]
    pub const fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }
}
