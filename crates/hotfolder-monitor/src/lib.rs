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

//! Per-item processing histories that can be checkpointed and resumed by key.
//!
//! Layout: `model.rs` (history data), `service.rs` (begin/resume and the history
//! handle), `recorder.rs` (recorder contract and fan-out), `database.rs` (persistence
//! and restore), `logging.rs` and `metric.rs` (observability recorders), `cleanup.rs`
//! (retention).

pub mod cleanup;
pub mod database;
pub mod error;
pub mod logging;
pub mod metric;
pub mod model;
pub mod recorder;
pub mod service;

pub use cleanup::{HistoryCleanup, StatusCondition};
pub use database::{DatabaseRecorder, DatabaseRestorer, HistoryRecord};
pub use error::{MonitorError, MonitorResult};
pub use logging::{LogLevels, LoggingRecorder};
pub use metric::{CounterRecorder, HistogramRecorder, TimerRecorder};
pub use model::{HistoryAction, HistoryData, HistoryEntry, Status, Step, SystemArea};
pub use recorder::{CompoundRecorder, MonitorRecorder};
pub use service::{FreshRestorer, HistoryRestorer, MonitorHistory, MonitorService};
