//! Configuration loading from YAML or JSON documents.
//!
//! # Design
//! - The document path comes from `HOTFOLDER_CONFIG`; the extension picks the format.
//! - Every successful load is validated before it is returned.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::model::HotfolderConfig;
use crate::validate::validate;

/// Environment variable naming the configuration document.
pub const CONFIG_ENV_VAR: &str = "HOTFOLDER_CONFIG";

/// Serialization format of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML document (default).
    Yaml,
    /// JSON document.
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension; anything but `.json` is YAML.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Load the document named by [`CONFIG_ENV_VAR`].
///
/// # Errors
///
/// Returns [`ConfigError::MissingPath`] when the variable is unset, or any error from
/// [`load_from_path`].
pub fn load_from_env() -> ConfigResult<HotfolderConfig> {
    load_with(|name| std::env::var(name).ok())
}

fn load_with(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<HotfolderConfig> {
    let path = lookup(CONFIG_ENV_VAR)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingPath {
            variable: CONFIG_ENV_VAR,
        })?;
    load_from_path(Path::new(&path))
}

/// Load and validate a configuration document from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read, decoded, or validated.
pub fn load_from_path(path: &Path) -> ConfigResult<HotfolderConfig> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        operation: "config.read",
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_str(&contents, ConfigFormat::from_path(path))?;
    info!(path = %path.display(), node_id = config.node.node_id, "configuration loaded");
    Ok(config)
}

/// Decode and validate a configuration document.
///
/// # Errors
///
/// Returns an error if the document cannot be decoded or fails validation.
pub fn parse_str(contents: &str, format: ConfigFormat) -> ConfigResult<HotfolderConfig> {
    let config: HotfolderConfig = match format {
        ConfigFormat::Yaml => {
            serde_yaml::from_str(contents).map_err(|source| ConfigError::Yaml { source })?
        }
        ConfigFormat::Json => {
            serde_json::from_str(contents).map_err(|source| ConfigError::Json { source })?
        }
    };
    validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComparatorKind, DedupBackend, LocalFilename};
    use anyhow::Result;

    const YAML: &str = r#"
node:
  node_id: 3
sync:
  remote_root: /srv/remote
  remote_directory: inbound
  local_directory: /srv/local
  max_fetch_size: 10
  move_to_remote_directory: processed
  local_filename: timestamp
  comparators:
    - kind: prefix
      priority: "product,price"
    - kind: timestamp
dedup:
  backend: expiring
routes:
  - name: products
    pattern: "^product"
    directory: /srv/products
"#;

    #[test]
    fn yaml_document_applies_defaults() -> Result<()> {
        let config = parse_str(YAML, ConfigFormat::Yaml)?;
        assert_eq!(config.node.node_id, 3);
        assert_eq!(config.node.tenant, "master");
        assert_eq!(config.sync.max_fetch_size, 10);
        assert_eq!(config.sync.temporary_file_suffix, ".writing");
        assert!(config.sync.auto_create_local_directory);
        assert_eq!(config.sync.local_filename, LocalFilename::Timestamp);
        assert_eq!(config.sync.comparators[0].kind, ComparatorKind::Prefix);
        assert_eq!(config.dedup.backend, DedupBackend::Expiring);
        assert_eq!(config.locks.ttl_ms, 10_000);
        assert_eq!(config.routes.len(), 1);
        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let doc = "sync:\n  remote_root: /r\n  remote_directory: in\n  local_directory: /l\n  bogus: 1\n";
        assert!(matches!(
            parse_str(doc, ConfigFormat::Yaml),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn json_files_are_detected_by_extension() -> Result<()> {
        let dir = tempfile::Builder::new().prefix("hotfolder-config").tempdir()?;
        let path = dir.path().join("node.json");
        fs::write(
            &path,
            r#"{"sync":{"remote_root":"/r","remote_directory":"in","local_directory":"/l"}}"#,
        )?;
        assert_eq!(ConfigFormat::from_path(&path), ConfigFormat::Json);
        let config = load_from_path(&path)?;
        assert_eq!(config.sync.max_fetch_size, -1);
        Ok(())
    }

    #[test]
    fn missing_variable_and_file_are_reported() -> Result<()> {
        assert!(matches!(
            load_with(|_| None),
            Err(ConfigError::MissingPath { variable }) if variable == CONFIG_ENV_VAR
        ));

        let dir = tempfile::Builder::new().prefix("hotfolder-config").tempdir()?;
        let missing = dir.path().join("absent.yaml");
        let missing_str = missing.to_string_lossy().into_owned();
        assert!(matches!(
            load_with(|_| Some(missing_str.clone())),
            Err(ConfigError::Io { operation: "config.read", .. })
        ));
        Ok(())
    }
}
