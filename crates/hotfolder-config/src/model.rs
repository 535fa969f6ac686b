//! Typed configuration sections.
//!
//! # Design
//! - Pure data carriers; validation lives in `validate.rs`.
//! - Unknown fields are rejected so typos surface at load time.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Root configuration document for one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HotfolderConfig {
    /// Cluster node identity.
    #[serde(default)]
    pub node: NodeConfig,
    /// Lease lock repository settings.
    #[serde(default)]
    pub locks: LockConfig,
    /// Dedup metadata store settings.
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Remote listing and transfer settings.
    pub sync: SyncConfig,
    /// Leader election settings.
    #[serde(default)]
    pub election: ElectionConfig,
    /// History recorder and cleanup settings.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Routing table applied to transferred files.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    /// Durable table storage.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Identity of this node within the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct NodeConfig {
    /// Cluster id recorded on lock rows and history entries.
    pub node_id: u32,
    /// Tenant the election executor is named after.
    pub tenant: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            tenant: defaults::tenant(),
        }
    }
}

/// Lease lock repository settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct LockConfig {
    /// Region lock rows are partitioned by.
    pub region: String,
    /// Lease time-to-live in milliseconds.
    pub ttl_ms: u64,
}

impl LockConfig {
    /// Lease time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            region: defaults::lock_region(),
            ttl_ms: defaults::lock_ttl_ms(),
        }
    }
}

/// Backend used for the accept-once filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DedupBackend {
    /// Durable store guarded by the lock repository.
    #[default]
    Locked,
    /// Process-local store with write expiry and size-bounded eviction.
    Expiring,
}

/// Dedup metadata store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct DedupConfig {
    /// Store backend.
    pub backend: DedupBackend,
    /// Region dedup rows are partitioned by.
    pub region: String,
    /// Prefix prepended to every item identity.
    pub key_prefix: String,
    /// Entry bound for the expiring backend.
    pub expiring_max_size: usize,
    /// Write expiry for the expiring backend in milliseconds.
    pub expiring_ttl_ms: u64,
}

impl DedupConfig {
    /// Write expiry for the expiring backend.
    #[must_use]
    pub const fn expiring_ttl(&self) -> Duration {
        Duration::from_millis(self.expiring_ttl_ms)
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            backend: DedupBackend::default(),
            region: defaults::dedup_region(),
            key_prefix: defaults::dedup_key_prefix(),
            expiring_max_size: defaults::expiring_max_size(),
            expiring_ttl_ms: defaults::expiring_ttl_ms(),
        }
    }
}

/// Strategy used to derive the local file name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocalFilename {
    /// Keep the remote file name.
    #[default]
    Remote,
    /// Append a UTC timestamp to the remote file name.
    Timestamp,
}

/// Ordering strategy for one comparator in the chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComparatorKind {
    /// Lexical order of the file name or a captured group.
    Name,
    /// Last-modified order.
    Timestamp,
    /// Numeric order of a captured sequence number.
    Sequence,
    /// Position of the first matching prefix in a priority list.
    Prefix,
}

impl ComparatorKind {
    /// Render the kind as its configuration name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Timestamp => "timestamp",
            Self::Sequence => "sequence",
            Self::Prefix => "prefix",
        }
    }
}

/// One comparator in the ordered chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ComparatorConfig {
    /// Comparator strategy.
    pub kind: ComparatorKind,
    /// Regex applied to the file name (`name`, `sequence`).
    #[serde(default)]
    pub pattern: Option<String>,
    /// Named capture group to extract (`name`, `sequence`).
    #[serde(default)]
    pub group: Option<String>,
    /// Comma separated prefix list, highest priority first (`prefix`).
    #[serde(default)]
    pub priority: Option<String>,
}

/// Remote listing and transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Root directory served by the filesystem remote.
    pub remote_root: PathBuf,
    /// Remote directory listed every cycle, relative to the root.
    pub remote_directory: String,
    /// Local directory files are transferred into.
    pub local_directory: PathBuf,
    /// Create the local directory when missing.
    #[serde(default = "defaults::enabled")]
    pub auto_create_local_directory: bool,
    /// Fetch cap per cycle; negative means unlimited and zero disables fetching.
    #[serde(default = "defaults::max_fetch_size")]
    pub max_fetch_size: i64,
    /// Suffix of the in-flight temp file.
    #[serde(default = "defaults::temporary_file_suffix")]
    pub temporary_file_suffix: String,
    /// Remote directory transferred items are moved to.
    #[serde(default)]
    pub move_to_remote_directory: Option<String>,
    /// Delete remote items after transfer.
    #[serde(default)]
    pub delete_remote_files: bool,
    /// Copy the remote last-modified time onto the local file.
    #[serde(default)]
    pub preserve_timestamp: bool,
    /// Only file names matching this regex are considered.
    #[serde(default)]
    pub filename_pattern: Option<String>,
    /// Local file naming strategy.
    #[serde(default)]
    pub local_filename: LocalFilename,
    /// Delay between poll cycles in milliseconds.
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Ordered comparator chain applied before filtering.
    #[serde(default)]
    pub comparators: Vec<ComparatorConfig>,
}

impl SyncConfig {
    /// Delay between poll cycles.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Leader election settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ElectionConfig {
    /// Role the election gates.
    pub role: String,
    /// Lock key candidates compete for.
    pub lock_key: String,
    /// Lease renewal interval while leading, in milliseconds.
    pub heartbeat_ms: u64,
    /// Retry interval while not leading, in milliseconds.
    pub busy_wait_ms: u64,
    /// Bound on waiting for the election thread at shutdown, in milliseconds.
    pub stop_timeout_ms: u64,
}

impl ElectionConfig {
    /// Lease renewal interval while leading.
    #[must_use]
    pub const fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// Retry interval while not leading.
    #[must_use]
    pub const fn busy_wait(&self) -> Duration {
        Duration::from_millis(self.busy_wait_ms)
    }

    /// Bound on waiting for the election thread at shutdown.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            role: defaults::election_role(),
            lock_key: defaults::election_lock_key(),
            heartbeat_ms: defaults::heartbeat_ms(),
            busy_wait_ms: defaults::busy_wait_ms(),
            stop_timeout_ms: defaults::stop_timeout_ms(),
        }
    }
}

/// Comparison applied by history cleanup to the configured status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CleanupCondition {
    /// Remove histories with exactly this status.
    #[default]
    Eq,
    /// Remove histories with any other status.
    Ne,
}

/// History recorder and cleanup settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct MonitorConfig {
    /// Persist histories to the durable store.
    pub database_enabled: bool,
    /// Log a summary of every recorded history.
    pub logging_enabled: bool,
    /// Count histories and steps.
    pub counter_enabled: bool,
    /// Observe step durations on the timer histogram.
    pub timer_enabled: bool,
    /// Observe step durations on the millisecond histogram.
    pub histogram_enabled: bool,
    /// Statuses logged at info.
    pub info_statuses: Vec<String>,
    /// Statuses logged at warn.
    pub warn_statuses: Vec<String>,
    /// Statuses logged at error.
    pub error_statuses: Vec<String>,
    /// Age in days after which histories are eligible for cleanup.
    pub cleanup_threshold_days: u32,
    /// Status the cleanup condition is evaluated against.
    pub cleanup_status: String,
    /// Whether cleanup matches or excludes `cleanup_status`.
    pub cleanup_condition: CleanupCondition,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            database_enabled: defaults::enabled(),
            logging_enabled: defaults::enabled(),
            counter_enabled: defaults::enabled(),
            timer_enabled: defaults::enabled(),
            histogram_enabled: defaults::enabled(),
            info_statuses: defaults::info_statuses(),
            warn_statuses: defaults::warn_statuses(),
            error_statuses: defaults::error_statuses(),
            cleanup_threshold_days: defaults::cleanup_threshold_days(),
            cleanup_status: defaults::cleanup_status(),
            cleanup_condition: CleanupCondition::default(),
        }
    }
}

/// One entry of the routing table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Route name used in history messages.
    pub name: String,
    /// Regex matched against the local file name.
    pub pattern: String,
    /// Directory matching files are moved into.
    pub directory: PathBuf,
}

/// Durable table storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields, default)]
pub struct StorageConfig {
    /// Directory holding JSON table files; tables stay in memory when absent.
    pub data_directory: Option<PathBuf>,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingSettings {
    /// Level directive used when `RUST_LOG` is unset.
    pub level: String,
    /// `json` or `pretty`; inferred from the build profile when absent.
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            format: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_defaults_follow_documented_values() {
        let locks = LockConfig::default();
        assert_eq!(locks.region, "Default");
        assert_eq!(locks.ttl(), Duration::from_secs(10));

        let election = ElectionConfig::default();
        assert_eq!(election.heartbeat(), Duration::from_millis(500));
        assert_eq!(election.busy_wait(), Duration::from_millis(50));
        assert_eq!(election.stop_timeout(), Duration::from_secs(30));

        let monitor = MonitorConfig::default();
        assert_eq!(monitor.cleanup_threshold_days, 7);
        assert_eq!(monitor.cleanup_condition, CleanupCondition::Eq);
        assert_eq!(NodeConfig::default().tenant, "master");
    }

    #[test]
    fn comparator_kind_names_match_serde() {
        for kind in [
            ComparatorKind::Name,
            ComparatorKind::Timestamp,
            ComparatorKind::Sequence,
            ComparatorKind::Prefix,
        ] {
            let rendered = serde_yaml::to_string(&kind).unwrap_or_default();
            assert_eq!(rendered.trim(), kind.as_str());
        }
    }
}
