//! Recorder writing a one-message summary of each history to the log.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::model::{HistoryAction, HistoryData, HistoryEntry, Status};
use crate::recorder::MonitorRecorder;

/// Which history statuses log at which level; unlisted statuses are not logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLevels {
    /// Statuses logged at info.
    pub info: Vec<Status>,
    /// Statuses logged at warn.
    pub warn: Vec<Status>,
    /// Statuses logged at error, with the exception message appended.
    pub error: Vec<Status>,
}

impl Default for LogLevels {
    fn default() -> Self {
        Self {
            info: vec![Status::InProgress, Status::Success],
            warn: vec![Status::Warning],
            error: vec![Status::Failure],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Warn,
    Error,
}

impl LogLevels {
    fn level(&self, status: Status) -> Option<Level> {
        if self.error.contains(&status) {
            Some(Level::Error)
        } else if self.warn.contains(&status) {
            Some(Level::Warn)
        } else if self.info.contains(&status) {
            Some(Level::Info)
        } else {
            None
        }
    }
}

/// Logs histories according to [`LogLevels`].
#[derive(Debug, Clone)]
pub struct LoggingRecorder {
    levels: LogLevels,
    enabled: bool,
}

impl LoggingRecorder {
    /// Recorder using `levels`.
    #[must_use]
    pub const fn new(levels: LogLevels, enabled: bool) -> Self {
        Self { levels, enabled }
    }

    /// Render the summary for `history`; error-level summaries carry the exception message.
    #[must_use]
    pub fn summary(history: &HistoryData, with_exception: bool) -> String {
        let mut out = format!(
            "{}:{} Status [{}]",
            history.area, history.key, history.status
        );
        for entry in &history.entries {
            out.push('\n');
            render_entry(&mut out, entry);
        }
        if with_exception && let Some(message) = &history.exception_message {
            let _ = write!(out, "\nException [{message}]");
        }
        out
    }
}

impl MonitorRecorder for LoggingRecorder {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn record(&self, history: &mut HistoryData) {
        let Some(level) = self.levels.level(history.status) else {
            return;
        };
        let summary = Self::summary(history, level == Level::Error);
        match level {
            Level::Info => info!(area = %history.area, key = %history.key, "{summary}"),
            Level::Warn => warn!(area = %history.area, key = %history.key, "{summary}"),
            Level::Error => error!(area = %history.area, key = %history.key, "{summary}"),
        }
    }
}

fn render_entry(out: &mut String, entry: &HistoryEntry) {
    let _ = write!(
        out,
        "Step [{}] Node [{}] Status [{}] Started [{}] Ended [{}] Duration [{}]ms Message [{}] Actions ",
        entry.step,
        entry.node_id,
        entry.status,
        timestamp(entry.started),
        timestamp(entry.ended),
        duration(entry.duration_ms),
        entry.message,
    );
    if entry.actions.is_empty() {
        out.push_str("[none]");
        return;
    }
    for action in &entry.actions {
        out.push_str("\n    ");
        render_action(out, action);
    }
}

fn render_action(out: &mut String, action: &HistoryAction) {
    let _ = write!(
        out,
        "Code [{}] Status [{}] Started [{}] Ended [{}] Duration [{}]ms Message [{}]",
        action.code,
        action.status,
        timestamp(action.started),
        timestamp(action.ended),
        duration(action.duration_ms),
        action.message,
    );
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(|| "-".to_string(), |at| at.to_rfc3339())
}

fn duration(value: Option<i64>) -> String {
    value.map_or_else(|| "-".to_string(), |ms| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Step, SystemArea};
    use chrono::TimeDelta;

    fn history() -> HistoryData {
        let start = DateTime::<Utc>::UNIX_EPOCH;
        let mut history = HistoryData::new(SystemArea::HotFolder, "a.csv100");
        history.entries.push(HistoryEntry {
            id: None,
            step: Step::Downloaded,
            status: Status::Success,
            started: Some(start),
            ended: Some(start + TimeDelta::milliseconds(30)),
            duration_ms: Some(30),
            node_id: 2,
            message: "File [a.csv]".into(),
            actions: Vec::new(),
        });
        history.entries.push(HistoryEntry {
            id: None,
            step: Step::Process,
            status: Status::Failure,
            started: None,
            ended: None,
            duration_ms: None,
            node_id: 2,
            message: "bad".into(),
            actions: vec![HistoryAction {
                code: "row-7".into(),
                status: Status::Failure,
                started: None,
                ended: None,
                duration_ms: None,
                message: "missing column".into(),
            }],
        });
        history.status = Status::Failure;
        history.exception_message = Some("parse error".into());
        history
    }

    #[test]
    fn summary_lists_entries_and_actions() {
        let summary = LoggingRecorder::summary(&history(), false);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "HOT_FOLDER:a.csv100 Status [FAILURE]");
        assert!(lines[1].starts_with("Step [DOWNLOADED] Node [2] Status [SUCCESS]"));
        assert!(lines[1].contains("Duration [30]ms"));
        assert!(lines[1].ends_with("Actions [none]"));
        assert!(lines[2].contains("Duration [-]ms"));
        assert!(lines[3].trim_start().starts_with("Code [row-7] Status [FAILURE]"));
        assert!(!summary.contains("parse error"));
    }

    #[test]
    fn error_summary_carries_exception() {
        let summary = LoggingRecorder::summary(&history(), true);
        assert!(summary.ends_with("Exception [parse error]"));
    }

    #[test]
    fn levels_follow_configuration() {
        let levels = LogLevels {
            info: vec![Status::Success],
            warn: Vec::new(),
            error: vec![Status::Failure],
        };
        assert_eq!(levels.level(Status::Success), Some(Level::Info));
        assert_eq!(levels.level(Status::Failure), Some(Level::Error));
        assert_eq!(levels.level(Status::Warning), None);
        assert_eq!(levels.level(Status::InProgress), None);
    }
}
