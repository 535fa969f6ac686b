//! # Design
//!
//! - Constant messages; keys, roles, and operations travel as fields.
//! - Lock contention on the metadata store is its own variant so callers can fail closed.

use std::error::Error as StdError;
use std::io;

use hotfolder_store::StoreError;
use thiserror::Error;

/// Result alias for coordination operations.
pub type CoordResult<T> = Result<T, CoordError>;

/// Errors raised by coordination primitives.
#[derive(Debug, Error)]
pub enum CoordError {
    /// The per-key lock guarding a metadata entry could not be obtained.
    #[error("metadata store busy")]
    StoreBusy {
        /// Metadata key that was contended.
        key: String,
    },
    /// The backing record store failed.
    #[error("record store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying store error.
        source: StoreError,
    },
    /// The election thread could not be spawned.
    #[error("failed to spawn election thread")]
    Spawn {
        /// Role the election was started for.
        role: String,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The election thread did not finish within the stop timeout.
    #[error("election thread did not stop in time")]
    StopTimeout {
        /// Role the election was running for.
        role: String,
    },
    /// A gated component failed to start or stop.
    #[error("lifecycle transition failed")]
    Lifecycle {
        /// Component name.
        component: String,
        /// Underlying failure.
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl CoordError {
    pub(crate) const fn store(operation: &'static str, source: StoreError) -> Self {
        Self::Store { operation, source }
    }

    /// Wrap a component failure raised during a lifecycle transition.
    pub fn lifecycle(
        component: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Lifecycle {
            component: component.into(),
            source: source.into(),
        }
    }

    /// Returns `true` when the error signals lock contention.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::StoreBusy { .. })
    }
}
