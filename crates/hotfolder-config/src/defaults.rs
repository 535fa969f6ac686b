//! Default values for configuration sections.
//!
//! # Design
//! - Serde default functions live here so the model stays declarative.
//! - Time-based defaults are explicit in milliseconds or days.

#![allow(clippy::redundant_pub_crate)]

pub(crate) const TENANT: &str = "master";
pub(crate) const LOCK_REGION: &str = "Default";
pub(crate) const LOCK_TTL_MS: u64 = 10_000;
pub(crate) const DEDUP_REGION: &str = "hot-folder";
pub(crate) const DEDUP_KEY_PREFIX: &str = "hotfolder:";
pub(crate) const EXPIRING_MAX_SIZE: usize = 1_000;
pub(crate) const EXPIRING_TTL_MS: u64 = 86_400_000;
pub(crate) const TEMPORARY_FILE_SUFFIX: &str = ".writing";
pub(crate) const POLL_INTERVAL_MS: u64 = 1_000;
pub(crate) const ELECTION_ROLE: &str = "hotfolder";
pub(crate) const ELECTION_LOCK_KEY: &str = "hotfolder-leader";
pub(crate) const HEARTBEAT_MS: u64 = 500;
pub(crate) const BUSY_WAIT_MS: u64 = 50;
pub(crate) const STOP_TIMEOUT_MS: u64 = 30_000;
pub(crate) const CLEANUP_THRESHOLD_DAYS: u32 = 7;
pub(crate) const CLEANUP_STATUS: &str = "SUCCESS";
pub(crate) const LOG_LEVEL: &str = "info";

pub(crate) fn tenant() -> String {
    TENANT.to_string()
}

pub(crate) fn lock_region() -> String {
    LOCK_REGION.to_string()
}

pub(crate) const fn lock_ttl_ms() -> u64 {
    LOCK_TTL_MS
}

pub(crate) fn dedup_region() -> String {
    DEDUP_REGION.to_string()
}

pub(crate) fn dedup_key_prefix() -> String {
    DEDUP_KEY_PREFIX.to_string()
}

pub(crate) const fn expiring_max_size() -> usize {
    EXPIRING_MAX_SIZE
}

pub(crate) const fn expiring_ttl_ms() -> u64 {
    EXPIRING_TTL_MS
}

pub(crate) const fn enabled() -> bool {
    true
}

pub(crate) const fn max_fetch_size() -> i64 {
    -1
}

pub(crate) fn temporary_file_suffix() -> String {
    TEMPORARY_FILE_SUFFIX.to_string()
}

pub(crate) const fn poll_interval_ms() -> u64 {
    POLL_INTERVAL_MS
}

pub(crate) fn election_role() -> String {
    ELECTION_ROLE.to_string()
}

pub(crate) fn election_lock_key() -> String {
    ELECTION_LOCK_KEY.to_string()
}

pub(crate) const fn heartbeat_ms() -> u64 {
    HEARTBEAT_MS
}

pub(crate) const fn busy_wait_ms() -> u64 {
    BUSY_WAIT_MS
}

pub(crate) const fn stop_timeout_ms() -> u64 {
    STOP_TIMEOUT_MS
}

pub(crate) fn info_statuses() -> Vec<String> {
    vec!["IN_PROGRESS".to_string(), "SUCCESS".to_string()]
}

pub(crate) fn warn_statuses() -> Vec<String> {
    vec!["WARNING".to_string()]
}

pub(crate) fn error_statuses() -> Vec<String> {
    vec!["FAILURE".to_string()]
}

pub(crate) const fn cleanup_threshold_days() -> u32 {
    CLEANUP_THRESHOLD_DAYS
}

pub(crate) fn cleanup_status() -> String {
    CLEANUP_STATUS.to_string()
}

pub(crate) fn log_level() -> String {
    LOG_LEVEL.to_string()
}
