//! History state machine: begin or resume a history, append steps, then checkpoint or end.
//!
//! # Design
//! - `begin`/`resume` hand back an owned [`MonitorHistory`] that the pipeline threads
//!   through its stages; a stage without a handle has nothing to annotate.
//! - `checkpoint` and `end` consume the handle, so a history is unreachable afterwards
//!   except by resuming it by (area, key).
//! - Actions are buffered on the handle and flushed into the next entry.

use std::error::Error as StdError;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::{
    HistoryAction, HistoryData, HistoryEntry, Status, Step, SystemArea, duration_ms,
};
use crate::recorder::MonitorRecorder;

/// Loads a previously recorded history.
pub trait HistoryRestorer: Send + Sync {
    /// Restore `(area, key)`, or return a fresh history when nothing usable is stored.
    fn restore(&self, area: SystemArea, key: &str) -> HistoryData;
}

/// Restorer for deployments without history persistence.
#[derive(Debug, Default, Clone, Copy)]
pub struct FreshRestorer;

impl HistoryRestorer for FreshRestorer {
    fn restore(&self, area: SystemArea, key: &str) -> HistoryData {
        HistoryData::new(area, key)
    }
}

struct ServiceInner {
    recorder: Arc<dyn MonitorRecorder>,
    restorer: Arc<dyn HistoryRestorer>,
    node_id: u32,
}

/// Entry point for creating and resuming histories.
#[derive(Clone)]
pub struct MonitorService {
    inner: Arc<ServiceInner>,
}

impl std::fmt::Debug for MonitorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorService")
            .field("node_id", &self.inner.node_id)
            .finish_non_exhaustive()
    }
}

impl MonitorService {
    /// Construct a service recording through `recorder` and resuming through `restorer`.
    #[must_use]
    pub fn new(
        recorder: Arc<dyn MonitorRecorder>,
        restorer: Arc<dyn HistoryRestorer>,
        node_id: u32,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                recorder,
                restorer,
                node_id,
            }),
        }
    }

    /// Start a fresh in-progress history.
    #[must_use]
    pub fn begin(&self, area: SystemArea, key: impl Into<String>) -> MonitorHistory {
        let data = HistoryData::new(area, key);
        debug!(area = %data.area, key = %data.key, "history started");
        MonitorHistory::new(Arc::clone(&self.inner), data)
    }

    /// Reattach to the history stored for `(area, key)`, or start a fresh one.
    #[must_use]
    pub fn resume(&self, area: SystemArea, key: &str) -> MonitorHistory {
        let data = self.inner.restorer.restore(area, key);
        debug!(area = %area, key, status = %data.status, entries = data.entries.len(), "history resumed");
        MonitorHistory::new(Arc::clone(&self.inner), data)
    }
}

/// Handle on one in-flight history.
pub struct MonitorHistory {
    service: Arc<ServiceInner>,
    data: HistoryData,
    actions: Vec<HistoryAction>,
}

impl std::fmt::Debug for MonitorHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHistory")
            .field("data", &self.data)
            .field("pending_actions", &self.actions.len())
            .finish_non_exhaustive()
    }
}

impl MonitorHistory {
    const fn new(service: Arc<ServiceInner>, data: HistoryData) -> Self {
        Self {
            service,
            data,
            actions: Vec::new(),
        }
    }

    /// Current state of the history.
    #[must_use]
    pub const fn data(&self) -> &HistoryData {
        &self.data
    }

    /// Buffer an action for the next entry.
    pub fn add_action(
        &mut self,
        code: impl Into<String>,
        status: Status,
        started: Option<DateTime<Utc>>,
        ended: Option<DateTime<Utc>>,
        message: impl Into<String>,
    ) -> &mut Self {
        self.actions.push(HistoryAction {
            code: code.into(),
            status,
            started,
            ended,
            duration_ms: duration_ms(started, ended),
            message: message.into(),
        });
        self
    }

    /// Append a successful entry, downgraded to warning when a buffered action failed.
    pub fn step_succeeded(
        &mut self,
        step: Step,
        started: Option<DateTime<Utc>>,
        ended: Option<DateTime<Utc>>,
        message: impl Into<String>,
    ) -> &mut Self {
        self.append(step, Status::Success, started, ended, None, message.into())
    }

    /// Append a failed entry, recording `error` on the history.
    pub fn step_failed(
        &mut self,
        step: Step,
        started: Option<DateTime<Utc>>,
        ended: Option<DateTime<Utc>>,
        error: Option<&(dyn StdError + 'static)>,
        message: impl Into<String>,
    ) -> &mut Self {
        self.append(step, Status::Failure, started, ended, error, message.into())
    }

    fn append(
        &mut self,
        step: Step,
        status: Status,
        started: Option<DateTime<Utc>>,
        ended: Option<DateTime<Utc>>,
        error: Option<&(dyn StdError + 'static)>,
        message: String,
    ) -> &mut Self {
        self.data.exception_message = error.map(render_error);
        let status = if status == Status::Success
            && self.actions.iter().any(|action| action.status.is_problem())
        {
            Status::Warning
        } else {
            status
        };
        self.data.entries.push(HistoryEntry {
            id: None,
            step,
            status,
            started,
            ended,
            duration_ms: duration_ms(started, ended),
            node_id: self.service.node_id,
            message,
            actions: std::mem::take(&mut self.actions),
        });
        self
    }

    /// Record the current state and release the handle; resume by key to continue.
    pub fn checkpoint(mut self) {
        debug!(area = %self.data.area, key = %self.data.key, "history checkpoint");
        self.service.recorder.record(&mut self.data);
    }

    /// Record the terminal status and release the handle, returning the status recorded.
    ///
    /// A successful end is downgraded to warning when any entry failed or warned.
    pub fn end(mut self, status: Status) -> Status {
        let status = if status == Status::Success && self.data.has_problem_entries() {
            Status::Warning
        } else {
            status
        };
        self.data.status = status;
        debug!(area = %self.data.area, key = %self.data.key, status = %status, "history ended");
        self.service.recorder.record(&mut self.data);
        status
    }
}

fn render_error(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::tests::Capture;
    use chrono::TimeDelta;
    use std::io;

    fn service() -> (MonitorService, Arc<Capture>) {
        let capture = Arc::new(Capture::default());
        (
            MonitorService::new(capture.clone(), Arc::new(FreshRestorer), 11),
            capture,
        )
    }

    #[test]
    fn begin_starts_in_progress_and_checkpoint_records() {
        let (service, capture) = service();
        let mut history = service.begin(SystemArea::HotFolder, "a.csv100");
        let start = DateTime::<Utc>::UNIX_EPOCH;
        history.step_succeeded(
            Step::Downloaded,
            Some(start),
            Some(start + TimeDelta::milliseconds(40)),
            "File [a.csv] size [12]",
        );
        assert_eq!(history.data().status, Status::InProgress);
        history.checkpoint();

        let recorded = capture.histories();
        assert_eq!(recorded.len(), 1);
        let entry = &recorded[0].entries[0];
        assert_eq!(entry.status, Status::Success);
        assert_eq!(entry.duration_ms, Some(40));
        assert_eq!(entry.node_id, 11);
        assert_eq!(recorded[0].status, Status::InProgress);
    }

    #[test]
    fn failed_action_downgrades_succeeded_step_and_clears_buffer() {
        let (service, capture) = service();
        let mut history = service.begin(SystemArea::Integration, "batch");
        history
            .add_action("row-1", Status::Success, None, None, "ok")
            .add_action("row-2", Status::Failure, None, None, "bad row")
            .step_succeeded(Step::HeaderExecuted, None, None, "executed");
        history.step_succeeded(Step::HeaderCleanup, None, None, "cleaned");
        assert_eq!(history.end(Status::Success), Status::Warning);

        let recorded = capture.histories();
        let entries = &recorded[0].entries;
        assert_eq!(entries[0].status, Status::Warning);
        assert_eq!(entries[0].actions.len(), 2);
        assert_eq!(entries[1].status, Status::Success);
        assert!(entries[1].actions.is_empty());
        assert_eq!(recorded[0].status, Status::Warning);
    }

    #[test]
    fn failed_step_records_error_and_later_success_clears_it() {
        let (service, _capture) = service();
        let mut history = service.begin(SystemArea::HotFolder, "a.csv1");
        let error = io::Error::other("blob vanished");
        history.step_failed(Step::Downloaded, None, None, Some(&error), "read failed");
        assert_eq!(history.data().exception_message.as_deref(), Some("blob vanished"));
        assert_eq!(history.data().entries[0].status, Status::Failure);

        history.step_succeeded(Step::Process, None, None, "retried");
        assert_eq!(history.data().exception_message, None);
    }

    #[test]
    fn end_keeps_non_success_status_and_clean_success() {
        let (service, _capture) = service();
        let mut history = service.begin(SystemArea::HotFolder, "ok");
        history.step_succeeded(Step::FileRouted, None, None, "routed");
        assert_eq!(history.end(Status::Success), Status::Success);

        let history = service.begin(SystemArea::HotFolder, "failed");
        assert_eq!(history.end(Status::Failure), Status::Failure);
    }

    #[test]
    fn resume_with_fresh_restorer_starts_over() {
        let (service, _capture) = service();
        let history = service.resume(SystemArea::HotFolder, "unknown");
        assert_eq!(history.data().status, Status::InProgress);
        assert!(history.data().entries.is_empty());
        assert_eq!(history.data().status_when_resumed, None);
    }
}
