//! Metric recorders: history/step counters and step-duration timers and histograms.
//!
//! # Design
//! - Only entries without an id are counted, so a checkpointed entry is observed once
//!   even when the history is recorded again after resuming.
//! - The history gauge moves from the resumed status to the current one.

use hotfolder_telemetry::Metrics;
use tracing::debug;

use crate::model::{HistoryData, HistoryEntry};
use crate::recorder::MonitorRecorder;

fn unsaved(history: &HistoryData) -> impl Iterator<Item = &HistoryEntry> {
    history.entries.iter().filter(|entry| entry.id.is_none())
}

fn entry_duration(entry: &HistoryEntry) -> Option<i64> {
    entry
        .duration_ms
        .or_else(|| Some((entry.ended? - entry.started?).num_milliseconds()))
}

/// Counts histories by status and unsaved entries by step.
#[derive(Debug, Clone)]
pub struct CounterRecorder {
    metrics: Metrics,
    enabled: bool,
}

impl CounterRecorder {
    /// Counter recorder over `metrics`.
    #[must_use]
    pub const fn new(metrics: Metrics, enabled: bool) -> Self {
        Self { metrics, enabled }
    }
}

impl MonitorRecorder for CounterRecorder {
    fn name(&self) -> &'static str {
        "counter"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn record(&self, history: &mut HistoryData) {
        let area = history.area.as_str();
        self.metrics
            .add_monitor_history(area, history.status.as_str(), 1);
        if let Some(previous) = history.status_when_resumed {
            self.metrics.add_monitor_history(area, previous.as_str(), -1);
        }
        for entry in unsaved(history) {
            self.metrics
                .inc_monitor_step(area, entry.step.as_str(), entry.status.as_str());
        }
    }
}

/// Observes unsaved entry durations on the seconds-based timer.
#[derive(Debug, Clone)]
pub struct TimerRecorder {
    metrics: Metrics,
    enabled: bool,
}

impl TimerRecorder {
    /// Timer recorder over `metrics`.
    #[must_use]
    pub const fn new(metrics: Metrics, enabled: bool) -> Self {
        Self { metrics, enabled }
    }
}

impl MonitorRecorder for TimerRecorder {
    fn name(&self) -> &'static str {
        "timer"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn record(&self, history: &mut HistoryData) {
        let area = history.area.as_str();
        for entry in unsaved(history) {
            let Some(millis) = entry_duration(entry) else {
                debug!(area, step = %entry.step, "entry has no duration; not timed");
                continue;
            };
            self.metrics.observe_monitor_step_timer(
                area,
                entry.step.as_str(),
                entry.status.as_str(),
                millis,
            );
        }
    }
}

/// Observes unsaved entry durations on the millisecond histogram.
#[derive(Debug, Clone)]
pub struct HistogramRecorder {
    metrics: Metrics,
    enabled: bool,
}

impl HistogramRecorder {
    /// Histogram recorder over `metrics`.
    #[must_use]
    pub const fn new(metrics: Metrics, enabled: bool) -> Self {
        Self { metrics, enabled }
    }
}

impl MonitorRecorder for HistogramRecorder {
    fn name(&self) -> &'static str {
        "histogram"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn record(&self, history: &mut HistoryData) {
        let area = history.area.as_str();
        for entry in unsaved(history) {
            let Some(millis) = entry_duration(entry) else {
                debug!(area, step = %entry.step, "entry has no duration; not observed");
                continue;
            };
            self.metrics.observe_monitor_step_histogram(
                area,
                entry.step.as_str(),
                entry.status.as_str(),
                millis,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Status, Step, SystemArea};
    use anyhow::Result;
    use chrono::{DateTime, TimeDelta, Utc};
    use uuid::Uuid;

    fn entry(step: Step, id: Option<Uuid>, duration_ms: Option<i64>) -> HistoryEntry {
        HistoryEntry {
            id,
            step,
            status: Status::Success,
            started: None,
            ended: None,
            duration_ms,
            node_id: 1,
            message: String::new(),
            actions: Vec::new(),
        }
    }

    #[test]
    fn counter_moves_gauge_from_resumed_status_and_counts_unsaved_steps() -> Result<()> {
        let metrics = Metrics::new()?;
        let recorder = CounterRecorder::new(metrics.clone(), true);

        let mut history = HistoryData::new(SystemArea::HotFolder, "a.csv1");
        history.entries.push(entry(Step::Downloaded, None, Some(5)));
        recorder.record(&mut history);
        assert_eq!(metrics.monitor_history_count("HOT_FOLDER", "IN_PROGRESS"), 1);

        history.entries[0].id = Some(Uuid::new_v4());
        history.entries.push(entry(Step::FileRouted, None, Some(5)));
        history.status_when_resumed = Some(Status::InProgress);
        history.status = Status::Success;
        recorder.record(&mut history);

        assert_eq!(metrics.monitor_history_count("HOT_FOLDER", "IN_PROGRESS"), 0);
        assert_eq!(metrics.monitor_history_count("HOT_FOLDER", "SUCCESS"), 1);
        assert_eq!(metrics.monitor_step_count("HOT_FOLDER", "DOWNLOADED", "SUCCESS"), 1);
        assert_eq!(metrics.monitor_step_count("HOT_FOLDER", "FILE_ROUTED", "SUCCESS"), 1);
        Ok(())
    }

    #[test]
    fn duration_recorders_skip_saved_and_untimed_entries() -> Result<()> {
        let metrics = Metrics::new()?;
        let timer = TimerRecorder::new(metrics.clone(), true);
        let histogram = HistogramRecorder::new(metrics.clone(), true);

        let start = DateTime::<Utc>::UNIX_EPOCH;
        let mut derived = entry(Step::Process, None, None);
        derived.started = Some(start);
        derived.ended = Some(start + TimeDelta::milliseconds(12));

        let mut history = HistoryData::new(SystemArea::Integration, "batch");
        history.entries.push(entry(Step::HeaderInit, Some(Uuid::new_v4()), Some(3)));
        history.entries.push(entry(Step::HeaderSetup, None, None));
        history.entries.push(derived);
        timer.record(&mut history);
        histogram.record(&mut history);

        for (step, expected) in [("HEADER_INIT", 0), ("HEADER_SETUP", 0), ("PROCESS", 1)] {
            assert_eq!(
                metrics.monitor_step_timer_samples("INTEGRATION", step, "SUCCESS"),
                expected
            );
            assert_eq!(
                metrics.monitor_step_histogram_samples("INTEGRATION", step, "SUCCESS"),
                expected
            );
        }
        Ok(())
    }

    #[test]
    fn entry_duration_prefers_explicit_value() {
        let start = DateTime::<Utc>::UNIX_EPOCH;
        let mut timed = entry(Step::Process, None, Some(7));
        timed.started = Some(start);
        timed.ended = Some(start + TimeDelta::milliseconds(100));
        assert_eq!(entry_duration(&timed), Some(7));
        assert_eq!(entry_duration(&entry(Step::Process, None, None)), None);
    }
}
