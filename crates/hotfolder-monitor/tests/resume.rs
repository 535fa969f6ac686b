//! Checkpoint a history on one node, resume and end it on another, with every recorder wired.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use hotfolder_monitor::{
    CompoundRecorder, CounterRecorder, DatabaseRecorder, DatabaseRestorer, HistogramRecorder,
    HistoryCleanup, HistoryRecord, LogLevels, LoggingRecorder, MonitorRecorder, MonitorService,
    Status, StatusCondition, Step, SystemArea, TimerRecorder,
};
use hotfolder_store::{JsonFileStore, ManualClock, RecordStore};
use hotfolder_telemetry::Metrics;

fn service(
    store: &Arc<JsonFileStore<HistoryRecord>>,
    clock: &Arc<ManualClock>,
    metrics: &Metrics,
    node_id: u32,
) -> MonitorService {
    let members: Vec<Arc<dyn MonitorRecorder>> = vec![
        Arc::new(LoggingRecorder::new(LogLevels::default(), true)),
        Arc::new(CounterRecorder::new(metrics.clone(), true)),
        Arc::new(TimerRecorder::new(metrics.clone(), true)),
        Arc::new(HistogramRecorder::new(metrics.clone(), false)),
        Arc::new(DatabaseRecorder::new(store.clone(), clock.clone(), true)),
    ];
    MonitorService::new(
        Arc::new(CompoundRecorder::new(members)),
        Arc::new(DatabaseRestorer::new(store.clone())),
        node_id,
    )
}

#[test]
fn history_survives_checkpoint_and_resumes_on_another_node() -> Result<()> {
    let dir = tempfile::Builder::new().prefix("hotfolder-monitor-").tempdir()?;
    let store = Arc::new(JsonFileStore::<HistoryRecord>::open(dir.path())?);
    let start = DateTime::<Utc>::UNIX_EPOCH + TimeDelta::days(30);
    let clock = Arc::new(ManualClock::new(start));
    let metrics = Metrics::new()?;

    let downloader = service(&store, &clock, &metrics, 1);
    let mut history = downloader.begin(SystemArea::HotFolder, "orders.csv1700000000000");
    history.step_succeeded(
        Step::Downloaded,
        Some(start),
        Some(start + TimeDelta::milliseconds(25)),
        "File [orders.csv] downloaded",
    );
    history.checkpoint();
    assert_eq!(metrics.monitor_history_count("HOT_FOLDER", "IN_PROGRESS"), 1);

    let router = service(&store, &clock, &metrics, 2);
    let mut resumed = router.resume(SystemArea::HotFolder, "orders.csv1700000000000");
    assert_eq!(resumed.data().status_when_resumed, Some(Status::InProgress));
    assert_eq!(resumed.data().entries.len(), 1);
    resumed.step_succeeded(Step::FileRouted, None, None, "Routed to [orders]");
    assert_eq!(resumed.end(Status::Success), Status::Success);

    assert_eq!(metrics.monitor_history_count("HOT_FOLDER", "IN_PROGRESS"), 0);
    assert_eq!(metrics.monitor_history_count("HOT_FOLDER", "SUCCESS"), 1);
    assert_eq!(metrics.monitor_step_count("HOT_FOLDER", "DOWNLOADED", "SUCCESS"), 1);
    assert_eq!(metrics.monitor_step_count("HOT_FOLDER", "FILE_ROUTED", "SUCCESS"), 1);
    assert_eq!(metrics.monitor_step_timer_samples("HOT_FOLDER", "DOWNLOADED", "SUCCESS"), 1);
    assert_eq!(metrics.monitor_step_histogram_samples("HOT_FOLDER", "DOWNLOADED", "SUCCESS"), 0);

    let reopened = JsonFileStore::<HistoryRecord>::open(dir.path())?;
    let rows = reopened.find(&|_: &HistoryRecord| true)?;
    assert_eq!(rows.len(), 1);
    let row = &rows[0].record;
    assert_eq!(row.status, Status::Success);
    let nodes: Vec<u32> = row.entries.iter().map(|entry| entry.node_id).collect();
    assert_eq!(nodes, vec![1, 2]);
    assert!(row.entries.iter().all(|entry| entry.id.is_some()));

    let cleanup = HistoryCleanup::new(store, 7, Status::Success, StatusCondition::Equal);
    assert_eq!(cleanup.cleanup(start + TimeDelta::days(3))?, 0);
    assert_eq!(cleanup.cleanup(start + TimeDelta::days(8))?, 1);
    Ok(())
}
