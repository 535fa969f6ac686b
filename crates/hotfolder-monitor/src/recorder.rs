//! Recorder contract and the fan-out recorder used by the monitor service.

use std::sync::Arc;

use tracing::debug;

use crate::model::HistoryData;

/// Sink for checkpointed or ended histories.
///
/// Recorders log their own failures; recording never fails the pipeline.
pub trait MonitorRecorder: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the recorder is switched on.
    fn enabled(&self) -> bool {
        true
    }

    /// Record `history`. Persisting recorders may assign ids.
    fn record(&self, history: &mut HistoryData);
}

/// Records through each enabled member in registration order.
///
/// Register metric recorders before the database recorder: metrics count entries that
/// have no id yet, and the database recorder assigns them.
#[derive(Default, Clone)]
pub struct CompoundRecorder {
    members: Vec<Arc<dyn MonitorRecorder>>,
}

impl std::fmt::Debug for CompoundRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.members.iter().map(|member| member.name()))
            .finish()
    }
}

impl CompoundRecorder {
    /// Recorder fanning out to `members` in order.
    #[must_use]
    pub fn new(members: Vec<Arc<dyn MonitorRecorder>>) -> Self {
        Self { members }
    }

    /// Append a member.
    #[must_use]
    pub fn with(mut self, member: Arc<dyn MonitorRecorder>) -> Self {
        self.members.push(member);
        self
    }
}

impl MonitorRecorder for CompoundRecorder {
    fn name(&self) -> &'static str {
        "compound"
    }

    fn record(&self, history: &mut HistoryData) {
        for member in &self.members {
            if member.enabled() {
                member.record(history);
            } else {
                debug!(
                    recorder = member.name(),
                    area = %history.area,
                    key = %history.key,
                    "recorder disabled; skipping"
                );
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{Status, SystemArea};
    use std::sync::Mutex;

    /// Recorder capturing every history it sees.
    #[derive(Default)]
    pub(crate) struct Capture {
        pub(crate) seen: Mutex<Vec<HistoryData>>,
        pub(crate) disabled: bool,
    }

    impl Capture {
        pub(crate) fn histories(&self) -> Vec<HistoryData> {
            self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
        }
    }

    impl MonitorRecorder for Capture {
        fn name(&self) -> &'static str {
            "capture"
        }

        fn enabled(&self) -> bool {
            !self.disabled
        }

        fn record(&self, history: &mut HistoryData) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(history.clone());
            }
            history.status_when_resumed = Some(Status::Warning);
        }
    }

    #[test]
    fn compound_skips_disabled_members_and_preserves_order() {
        let first = Arc::new(Capture::default());
        let disabled = Arc::new(Capture {
            disabled: true,
            ..Capture::default()
        });
        let last = Arc::new(Capture::default());
        let members: Vec<Arc<dyn MonitorRecorder>> = vec![first.clone(), disabled.clone()];
        let compound = CompoundRecorder::new(members).with(last.clone());

        let mut history = HistoryData::new(SystemArea::HotFolder, "a.csv1");
        compound.record(&mut history);

        assert_eq!(first.histories().len(), 1);
        assert!(disabled.histories().is_empty());
        let seen_by_last = last.histories();
        assert_eq!(seen_by_last[0].status_when_resumed, Some(Status::Warning));
    }
}
