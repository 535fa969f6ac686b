//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters, gauges, and histograms used by the synchronizer, the
//!   history recorders, and leader election.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use serde::Serialize;

use crate::error::{TelemetryError, TelemetryResult};

const DURATION_MS_BUCKETS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0,
    60_000.0,
];

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    sync_items_total: IntCounterVec,
    monitor_histories: IntGaugeVec,
    monitor_steps_total: IntCounterVec,
    monitor_step_seconds: HistogramVec,
    monitor_step_duration_ms: HistogramVec,
    leader_transitions_total: IntCounterVec,
    leader_active: IntGaugeVec,
}

/// Snapshot of selected counters for health reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Items transferred to the local directory.
    pub items_transferred: u64,
    /// Items skipped because a fresh local copy existed.
    pub items_skipped: u64,
    /// Items whose dedup acceptance was reverted after a failed rename.
    pub items_reverted: u64,
    /// Items un-marked by fetch-cap or failure rollback.
    pub items_rolled_back: u64,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let sync_items_total = IntCounterVec::new(
            Opts::new(
                "sync_items_total",
                "Remote items handled by the synchronizer by outcome",
            ),
            &["outcome"],
        )
        .map_err(|source| TelemetryError::collector("sync_items_total", "build", source))?;
        let monitor_histories = IntGaugeVec::new(
            Opts::new(
                "monitor_histories",
                "Recorded processing histories by area and status",
            ),
            &["area", "status"],
        )
        .map_err(|source| TelemetryError::collector("monitor_histories", "build", source))?;
        let monitor_steps_total = IntCounterVec::new(
            Opts::new(
                "monitor_steps_total",
                "Recorded history steps by area, step, and status",
            ),
            &["area", "step", "status"],
        )
        .map_err(|source| TelemetryError::collector("monitor_steps_total", "build", source))?;
        let monitor_step_seconds = HistogramVec::new(
            HistogramOpts::new(
                "monitor_step_seconds",
                "Time spent in a history step (seconds)",
            ),
            &["area", "step", "status"],
        )
        .map_err(|source| TelemetryError::collector("monitor_step_seconds", "build", source))?;
        let monitor_step_duration_ms = HistogramVec::new(
            HistogramOpts::new(
                "monitor_step_duration_ms",
                "Distribution of history step durations (ms)",
            )
            .buckets(DURATION_MS_BUCKETS.to_vec()),
            &["area", "step", "status"],
        )
        .map_err(|source| TelemetryError::collector("monitor_step_duration_ms", "build", source))?;
        let leader_transitions_total = IntCounterVec::new(
            Opts::new(
                "leader_transitions_total",
                "Leadership grants and revocations by role",
            ),
            &["role", "event"],
        )
        .map_err(|source| TelemetryError::collector("leader_transitions_total", "build", source))?;
        let leader_active = IntGaugeVec::new(
            Opts::new("leader_active", "Whether this node currently leads a role"),
            &["role"],
        )
        .map_err(|source| TelemetryError::collector("leader_active", "build", source))?;

        register(&registry, "sync_items_total", &sync_items_total)?;
        register(&registry, "monitor_histories", &monitor_histories)?;
        register(&registry, "monitor_steps_total", &monitor_steps_total)?;
        register(&registry, "monitor_step_seconds", &monitor_step_seconds)?;
        register(
            &registry,
            "monitor_step_duration_ms",
            &monitor_step_duration_ms,
        )?;
        register(
            &registry,
            "leader_transitions_total",
            &leader_transitions_total,
        )?;
        register(&registry, "leader_active", &leader_active)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                sync_items_total,
                monitor_histories,
                monitor_steps_total,
                monitor_step_seconds,
                monitor_step_duration_ms,
                leader_transitions_total,
                leader_active,
            }),
        })
    }

    /// Count a synchronizer item outcome (`transferred`, `skipped`, `reverted`, `rolled_back`).
    pub fn inc_sync_item(&self, outcome: &str) {
        self.inc_sync_items(outcome, 1);
    }

    /// Count several synchronizer items with the same outcome.
    pub fn inc_sync_items(&self, outcome: &str, count: u64) {
        self.inner
            .sync_items_total
            .with_label_values(&[outcome])
            .inc_by(count);
    }

    /// Adjust the recorded-history gauge for an area/status pair.
    pub fn add_monitor_history(&self, area: &str, status: &str, delta: i64) {
        self.inner
            .monitor_histories
            .with_label_values(&[area, status])
            .add(delta);
    }

    /// Count a recorded history step.
    pub fn inc_monitor_step(&self, area: &str, step: &str, status: &str) {
        self.inner
            .monitor_steps_total
            .with_label_values(&[area, step, status])
            .inc();
    }

    /// Record a step duration on the timer histogram (observed in seconds).
    #[allow(clippy::cast_precision_loss)]
    pub fn observe_monitor_step_timer(&self, area: &str, step: &str, status: &str, millis: i64) {
        self.inner
            .monitor_step_seconds
            .with_label_values(&[area, step, status])
            .observe(millis as f64 / 1_000.0);
    }

    /// Record a step duration on the millisecond histogram.
    #[allow(clippy::cast_precision_loss)]
    pub fn observe_monitor_step_histogram(
        &self,
        area: &str,
        step: &str,
        status: &str,
        millis: i64,
    ) {
        self.inner
            .monitor_step_duration_ms
            .with_label_values(&[area, step, status])
            .observe(millis as f64);
    }

    /// Record a leadership transition and update the active gauge.
    pub fn record_leadership(&self, role: &str, granted: bool) {
        let event = if granted { "granted" } else { "revoked" };
        self.inner
            .leader_transitions_total
            .with_label_values(&[role, event])
            .inc();
        self.inner
            .leader_active
            .with_label_values(&[role])
            .set(i64::from(granted));
    }

    /// Current value of the recorded-history gauge.
    #[must_use]
    pub fn monitor_history_count(&self, area: &str, status: &str) -> i64 {
        self.inner
            .monitor_histories
            .with_label_values(&[area, status])
            .get()
    }

    /// Current value of the step counter.
    #[must_use]
    pub fn monitor_step_count(&self, area: &str, step: &str, status: &str) -> u64 {
        self.inner
            .monitor_steps_total
            .with_label_values(&[area, step, status])
            .get()
    }

    /// Number of observations on the timer histogram.
    #[must_use]
    pub fn monitor_step_timer_samples(&self, area: &str, step: &str, status: &str) -> u64 {
        self.inner
            .monitor_step_seconds
            .with_label_values(&[area, step, status])
            .get_sample_count()
    }

    /// Number of observations on the millisecond histogram.
    #[must_use]
    pub fn monitor_step_histogram_samples(&self, area: &str, step: &str, status: &str) -> u64 {
        self.inner
            .monitor_step_duration_ms
            .with_label_values(&[area, step, status])
            .get_sample_count()
    }

    /// Whether the leader gauge is set for `role`.
    #[must_use]
    pub fn is_leader(&self, role: &str) -> bool {
        self.inner.leader_active.with_label_values(&[role]).get() > 0
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::Render {
                operation: "encode",
                source,
            })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::RenderUtf8 { source })
    }

    /// Take a point-in-time snapshot of the synchronizer counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counter = |outcome: &str| {
            self.inner
                .sync_items_total
                .with_label_values(&[outcome])
                .get()
        };
        MetricsSnapshot {
            items_transferred: counter("transferred"),
            items_skipped: counter("skipped"),
            items_reverted: counter("reverted"),
            items_rolled_back: counter("rolled_back"),
        }
    }
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> TelemetryResult<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::collector(name, "register", source))
}
