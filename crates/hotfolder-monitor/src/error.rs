//! Error types for history persistence and parsing.

use hotfolder_store::StoreError;
use thiserror::Error;

/// Result alias for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors raised by the monitor crate.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The history table could not be read or written.
    #[error("history store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying store error.
        source: StoreError,
    },
    /// A status name was not recognised.
    #[error("unknown history status")]
    UnknownStatus {
        /// Offending value.
        value: String,
    },
}

impl MonitorError {
    pub(crate) const fn store(operation: &'static str, source: StoreError) -> Self {
        Self::Store { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn store_error_keeps_source() {
        let err = MonitorError::store("history.cleanup", StoreError::Unavailable { operation: "remove_all" });
        assert_eq!(err.to_string(), "history store operation failed");
        assert!(err.source().is_some());
        let unknown = MonitorError::UnknownStatus { value: "MAYBE".into() };
        assert!(unknown.source().is_none());
    }
}
