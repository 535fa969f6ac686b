//! # Design
//!
//! - Centralize application-level errors for bootstrap, routing, and polling.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: hotfolder_config::ConfigError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: hotfolder_telemetry::TelemetryError,
    },
    /// Durable table operations failed.
    #[error("record store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Source store error.
        source: hotfolder_store::StoreError,
    },
    /// Coordination operations failed.
    #[error("coordination operation failed")]
    Coord {
        /// Operation identifier.
        operation: &'static str,
        /// Source coordination error.
        source: hotfolder_coord::CoordError,
    },
    /// Synchronization operations failed.
    #[error("synchronization operation failed")]
    Sync {
        /// Operation identifier.
        operation: &'static str,
        /// Source synchronization error.
        source: hotfolder_sync::SyncError,
    },
    /// History monitoring operations failed.
    #[error("history monitoring operation failed")]
    Monitor {
        /// Operation identifier.
        operation: &'static str,
        /// Source monitor error.
        source: hotfolder_monitor::MonitorError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
    /// Configuration values were invalid.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Optional value associated with the failure.
        value: Option<String>,
    },
    /// One or more lifecycles failed to start.
    #[error("node startup failed")]
    Startup {
        /// Number of lifecycles that failed.
        failed: usize,
    },
    /// A background task could not be joined.
    #[error("background task failed")]
    Join {
        /// Task identifier.
        task: &'static str,
        /// Source join error.
        source: tokio::task::JoinError,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: hotfolder_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: hotfolder_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn store(operation: &'static str, source: hotfolder_store::StoreError) -> Self {
        Self::Store { operation, source }
    }

    pub(crate) const fn coord(operation: &'static str, source: hotfolder_coord::CoordError) -> Self {
        Self::Coord { operation, source }
    }

    pub(crate) const fn sync(operation: &'static str, source: hotfolder_sync::SyncError) -> Self {
        Self::Sync { operation, source }
    }

    pub(crate) const fn monitor(
        operation: &'static str,
        source: hotfolder_monitor::MonitorError,
    ) -> Self {
        Self::Monitor { operation, source }
    }

    pub(crate) fn io(operation: &'static str, path: Option<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn app_error_helpers_build_variants() {
        let config = AppError::config(
            "config.load",
            hotfolder_config::ConfigError::MissingPath {
                variable: "HOTFOLDER_CONFIG",
            },
        );
        assert!(matches!(config, AppError::Config { .. }));
        assert_eq!(config.to_string(), "configuration operation failed");

        let store = AppError::store(
            "tables.open",
            hotfolder_store::StoreError::Unavailable { operation: "find" },
        );
        assert!(store.source().is_some());

        let coord = AppError::coord(
            "roles.start",
            hotfolder_coord::CoordError::StopTimeout {
                role: "hotfolder".into(),
            },
        );
        assert!(matches!(coord, AppError::Coord { operation: "roles.start", .. }));

        let sync = AppError::sync("source.new", hotfolder_sync::SyncError::NotRunning);
        assert!(matches!(sync, AppError::Sync { .. }));

        let monitor = AppError::monitor(
            "monitor.levels",
            hotfolder_monitor::MonitorError::UnknownStatus {
                value: "MAYBE".into(),
            },
        );
        assert!(matches!(monitor, AppError::Monitor { .. }));

        let io = AppError::io("route.move", None, io::Error::other("busy"));
        assert!(matches!(io, AppError::Io { path: None, .. }));
    }
}
