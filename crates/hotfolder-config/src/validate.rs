//! Cross-field validation for a loaded configuration document.

use regex::Regex;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{ComparatorConfig, ComparatorKind, HotfolderConfig, MonitorConfig};

/// History status names accepted in monitor settings.
pub const KNOWN_STATUSES: [&str; 4] = ["IN_PROGRESS", "SUCCESS", "WARNING", "FAILURE"];

/// Validate a configuration document.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for the first rule the document breaks.
pub fn validate(config: &HotfolderConfig) -> ConfigResult<()> {
    ensure_not_blank("locks", "region", &config.locks.region)?;
    ensure_positive("locks", "ttl_ms", config.locks.ttl_ms)?;
    ensure_not_blank("dedup", "region", &config.dedup.region)?;
    ensure_positive("dedup", "expiring_ttl_ms", config.dedup.expiring_ttl_ms)?;
    if config.dedup.expiring_max_size == 0 {
        return Err(ConfigError::invalid(
            "dedup",
            "expiring_max_size",
            Some("0"),
            "must_be_positive",
        ));
    }

    let sync = &config.sync;
    if sync.delete_remote_files && sync.move_to_remote_directory.is_some() {
        return Err(ConfigError::invalid(
            "sync",
            "delete_remote_files",
            sync.move_to_remote_directory.as_deref(),
            "exclusive_with_move_to_remote_directory",
        ));
    }
    ensure_not_blank("sync", "temporary_file_suffix", &sync.temporary_file_suffix)?;
    ensure_positive("sync", "poll_interval_ms", sync.poll_interval_ms)?;
    if let Some(pattern) = &sync.filename_pattern {
        compile("sync", "filename_pattern", pattern)?;
    }
    for comparator in &sync.comparators {
        validate_comparator(comparator)?;
    }

    ensure_not_blank("election", "role", &config.election.role)?;
    ensure_not_blank("election", "lock_key", &config.election.lock_key)?;
    ensure_positive("election", "heartbeat_ms", config.election.heartbeat_ms)?;
    ensure_positive("election", "busy_wait_ms", config.election.busy_wait_ms)?;
    ensure_positive("election", "stop_timeout_ms", config.election.stop_timeout_ms)?;
    if config.election.heartbeat_ms >= config.locks.ttl_ms {
        return Err(ConfigError::invalid(
            "election",
            "heartbeat_ms",
            Some(&config.election.heartbeat_ms.to_string()),
            "must_be_below_lock_ttl",
        ));
    }

    validate_monitor(&config.monitor)?;

    for route in &config.routes {
        ensure_not_blank("routes", "name", &route.name)?;
        compile("routes", "pattern", &route.pattern)?;
    }
    Ok(())
}

fn validate_comparator(comparator: &ComparatorConfig) -> ConfigResult<()> {
    match comparator.kind {
        ComparatorKind::Timestamp => Ok(()),
        ComparatorKind::Name => {
            let Some(pattern) = &comparator.pattern else {
                return Ok(());
            };
            let regex = compile("sync.comparators", "pattern", pattern)?;
            ensure_group(&regex, comparator.group.as_deref())
        }
        ComparatorKind::Sequence => {
            let pattern = comparator.pattern.as_deref().ok_or_else(|| {
                ConfigError::invalid("sync.comparators", "pattern", None, "required_for_sequence")
            })?;
            let regex = compile("sync.comparators", "pattern", pattern)?;
            let group = comparator.group.as_deref().ok_or_else(|| {
                ConfigError::invalid("sync.comparators", "group", None, "required_for_sequence")
            })?;
            ensure_group(&regex, Some(group))
        }
        ComparatorKind::Prefix => {
            let priority = comparator.priority.as_deref().unwrap_or_default();
            if priority.split(',').all(|prefix| prefix.trim().is_empty()) {
                return Err(ConfigError::invalid(
                    "sync.comparators",
                    "priority",
                    comparator.priority.as_deref(),
                    "required_for_prefix",
                ));
            }
            Ok(())
        }
    }
}

fn ensure_group(regex: &Regex, group: Option<&str>) -> ConfigResult<()> {
    let Some(group) = group else {
        return Ok(());
    };
    if regex.capture_names().flatten().any(|name| name == group) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            "sync.comparators",
            "group",
            Some(group),
            "not_a_named_group",
        ))
    }
}

fn validate_monitor(monitor: &MonitorConfig) -> ConfigResult<()> {
    for (field, statuses) in [
        ("info_statuses", &monitor.info_statuses),
        ("warn_statuses", &monitor.warn_statuses),
        ("error_statuses", &monitor.error_statuses),
    ] {
        for status in statuses {
            ensure_status(field, status)?;
        }
    }
    ensure_status("cleanup_status", &monitor.cleanup_status)?;
    if monitor.cleanup_threshold_days == 0 {
        return Err(ConfigError::invalid(
            "monitor",
            "cleanup_threshold_days",
            Some("0"),
            "must_be_positive",
        ));
    }
    Ok(())
}

fn ensure_status(field: &'static str, status: &str) -> ConfigResult<()> {
    if KNOWN_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            "monitor",
            field,
            Some(status),
            "unknown_status",
        ))
    }
}

fn ensure_not_blank(section: &'static str, field: &'static str, value: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(section, field, Some(value), "must_not_be_empty"));
    }
    Ok(())
}

fn ensure_positive(section: &'static str, field: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(section, field, Some("0"), "must_be_positive"));
    }
    Ok(())
}

fn compile(section: &'static str, field: &'static str, pattern: &str) -> ConfigResult<Regex> {
    Regex::new(pattern)
        .map_err(|_| ConfigError::invalid(section, field, Some(pattern), "invalid_regex"))
}
