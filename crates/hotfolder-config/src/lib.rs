#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! File-backed configuration for a hot folder node.
//!
//! Layout: `model.rs` (typed sections), `defaults.rs` (default values),
//! `validate.rs` (cross-field validation), `loader.rs` (YAML/JSON loading).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_ENV_VAR, ConfigFormat, load_from_env, load_from_path, parse_str};
pub use model::{
    ComparatorConfig, ComparatorKind, CleanupCondition, DedupBackend, DedupConfig,
    ElectionConfig, HotfolderConfig, LocalFilename, LockConfig, LoggingSettings, MonitorConfig,
    NodeConfig, RouteConfig, StorageConfig, SyncConfig,
};
pub use validate::{KNOWN_STATUSES, validate};
