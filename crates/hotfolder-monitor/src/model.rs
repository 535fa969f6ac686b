//! History data carried through a pipeline and handed to recorders.
//!
//! # Design
//! - A history is one linear sequence of named steps for one item, keyed by (area, key).
//! - Entries without an id have not been persisted yet; metric recorders only count those.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use hotfolder_store::RecordId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MonitorError;

/// Outcome of a history, entry, or action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Work is still running.
    InProgress,
    /// Work completed.
    Success,
    /// Work completed with problems.
    Warning,
    /// Work failed.
    Failure,
}

impl Status {
    /// Upper-case name used in logs, metrics, and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Failure => "FAILURE",
        }
    }

    /// Whether this status downgrades an otherwise successful parent.
    #[must_use]
    pub const fn is_problem(self) -> bool {
        matches!(self, Self::Warning | Self::Failure)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = MonitorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "IN_PROGRESS" => Ok(Self::InProgress),
            "SUCCESS" => Ok(Self::Success),
            "WARNING" => Ok(Self::Warning),
            "FAILURE" => Ok(Self::Failure),
            other => Err(MonitorError::UnknownStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// Named pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    /// Remote file read into the local directory.
    Downloaded,
    /// Local file routed to its processing channel.
    FileRouted,
    /// Archive extracted.
    FileUnzipped,
    /// Import header initialised.
    HeaderInit,
    /// Import header set up.
    HeaderSetup,
    /// Import header transformed.
    HeaderTransformed,
    /// Import header executed.
    HeaderExecuted,
    /// Import header cleaned up.
    HeaderCleanup,
    /// Generic processing.
    Process,
}

impl Step {
    /// Upper-case name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Downloaded => "DOWNLOADED",
            Self::FileRouted => "FILE_ROUTED",
            Self::FileUnzipped => "FILE_UNZIPPED",
            Self::HeaderInit => "HEADER_INIT",
            Self::HeaderSetup => "HEADER_SETUP",
            Self::HeaderTransformed => "HEADER_TRANSFORMED",
            Self::HeaderExecuted => "HEADER_EXECUTED",
            Self::HeaderCleanup => "HEADER_CLEANUP",
            Self::Process => "PROCESS",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subsystem a history belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemArea {
    /// Hot folder ingestion.
    HotFolder,
    /// Downstream integration.
    Integration,
}

impl SystemArea {
    /// Upper-case name used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HotFolder => "HOT_FOLDER",
            Self::Integration => "INTEGRATION",
        }
    }
}

impl fmt::Display for SystemArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fine-grained sub-step buffered until the next entry is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryAction {
    /// Caller-chosen action code.
    pub code: String,
    /// Outcome.
    pub status: Status,
    /// Start time, when known.
    pub started: Option<DateTime<Utc>>,
    /// End time, when known.
    pub ended: Option<DateTime<Utc>>,
    /// `ended - started` in milliseconds, when both are known.
    pub duration_ms: Option<i64>,
    /// Rendered message.
    pub message: String,
}

/// One pipeline stage of a history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Identifier assigned when the entry is first persisted.
    pub id: Option<Uuid>,
    /// Stage.
    pub step: Step,
    /// Outcome.
    pub status: Status,
    /// Start time, when known.
    pub started: Option<DateTime<Utc>>,
    /// End time, when known.
    pub ended: Option<DateTime<Utc>>,
    /// `ended - started` in milliseconds, when both are known.
    pub duration_ms: Option<i64>,
    /// Cluster node that recorded the entry.
    pub node_id: u32,
    /// Rendered message.
    pub message: String,
    /// Actions buffered before this entry.
    pub actions: Vec<HistoryAction>,
}

/// Processing history of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryData {
    /// Row id once persisted.
    pub record_id: Option<RecordId>,
    /// Subsystem.
    pub area: SystemArea,
    /// Item key, typically file name plus last-modified time.
    pub key: String,
    /// Current status.
    pub status: Status,
    /// Status the history had when it was restored.
    pub status_when_resumed: Option<Status>,
    /// Message of the most recent step failure.
    pub exception_message: Option<String>,
    /// Recorded entries, oldest first.
    pub entries: Vec<HistoryEntry>,
}

impl HistoryData {
    /// Fresh in-progress history for `(area, key)`.
    #[must_use]
    pub fn new(area: SystemArea, key: impl Into<String>) -> Self {
        Self {
            record_id: None,
            area,
            key: key.into(),
            status: Status::InProgress,
            status_when_resumed: None,
            exception_message: None,
            entries: Vec::new(),
        }
    }

    /// Whether any entry failed or warned.
    #[must_use]
    pub fn has_problem_entries(&self) -> bool {
        self.entries.iter().any(|entry| entry.status.is_problem())
    }
}

pub(crate) fn duration_ms(
    started: Option<DateTime<Utc>>,
    ended: Option<DateTime<Utc>>,
) -> Option<i64> {
    Some((ended? - started?).num_milliseconds())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::TimeDelta;

    #[test]
    fn status_names_round_trip_through_from_str_and_serde() -> Result<()> {
        for status in [
            Status::InProgress,
            Status::Success,
            Status::Warning,
            Status::Failure,
        ] {
            assert_eq!(status.as_str().parse::<Status>()?, status);
            assert_eq!(serde_json::to_value(status)?, status.as_str());
        }
        assert!(matches!(
            "MAYBE".parse::<Status>(),
            Err(MonitorError::UnknownStatus { .. })
        ));
        Ok(())
    }

    #[test]
    fn duration_needs_both_ends() {
        let start = DateTime::<Utc>::UNIX_EPOCH;
        let end = start + TimeDelta::milliseconds(1_250);
        assert_eq!(duration_ms(Some(start), Some(end)), Some(1_250));
        assert_eq!(duration_ms(None, Some(end)), None);
        assert_eq!(duration_ms(Some(start), None), None);
    }

    #[test]
    fn step_and_area_render_upper_case() {
        assert_eq!(Step::HeaderTransformed.to_string(), "HEADER_TRANSFORMED");
        assert_eq!(SystemArea::HotFolder.to_string(), "HOT_FOLDER");
        assert!(HistoryData::new(SystemArea::Integration, "k").entries.is_empty());
    }
}
