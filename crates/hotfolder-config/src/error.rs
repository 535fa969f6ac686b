//! Error types for configuration loading and validation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while reading or validating a node configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting was present but unusable.
    #[error("invalid configuration field")]
    InvalidField {
        /// Top-level section holding the setting (`locks`, `sync`, ...).
        section: &'static str,
        /// Setting name within the section.
        field: &'static str,
        /// Rejected value, when it can be shown.
        value: Option<String>,
        /// Stable reason code.
        reason: &'static str,
    },
    /// The configuration path variable was not set.
    #[error("configuration path not provided")]
    MissingPath {
        /// Environment variable that was consulted.
        variable: &'static str,
    },
    /// The configuration file could not be read.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// YAML document could not be decoded.
    #[error("failed to parse yaml configuration")]
    Yaml {
        /// Source YAML error.
        source: serde_yaml::Error,
    },
    /// JSON document could not be decoded.
    #[error("failed to parse json configuration")]
    Json {
        /// Source JSON error.
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        section: &'static str,
        field: &'static str,
        value: Option<&str>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section,
            field,
            value: value.map(str::to_string),
            reason,
        }
    }
}

/// Result of loading or validating configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;
