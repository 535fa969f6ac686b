//! Node assembly and the binary boot sequence.
//!
//! # Design
//! - [`Node::build`] turns a validated configuration into the component graph without
//!   starting anything, so tests can drive single cycles.
//! - Lock repository, election, poller, and source start in that order and stop in reverse.
//! - Tables are file backed when a data directory is configured and in-memory otherwise.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hotfolder_config::{
    CleanupCondition, ComparatorConfig, ComparatorKind, DedupBackend, HotfolderConfig,
    LocalFilename, MonitorConfig,
};
use hotfolder_coord::{
    ExpiringMetadataStore, LeaderInitiator, LeaderSettings, Lifecycle, LockRecord, LockRegistry,
    LockRepository, LockSettings, LockedMetadataStore, MetadataRecord, MetadataStore,
    RoleController,
};
use hotfolder_events::EventBus;
use hotfolder_monitor::{
    CompoundRecorder, CounterRecorder, DatabaseRecorder, DatabaseRestorer, FreshRestorer,
    HistogramRecorder, HistoryCleanup, HistoryRecord, HistoryRestorer, LogLevels,
    LoggingRecorder, MonitorRecorder, MonitorService, Status, StatusCondition, TimerRecorder,
};
use hotfolder_store::{Clock, JsonFileStore, MemoryStore, Record, RecordStore, SystemClock};
use hotfolder_sync::{
    AcceptOnceFilter, ChainFilter, ComparatorChain, FileListFilter, FsRemote,
    LocalNameGenerator, NameComparator, PrefixComparator, RegexPatternFilter, RemoteDisposition,
    RemoteNames, SequenceComparator, SynchronizingSource, Synchronizer, TimestampComparator,
    TimestampNames, TransferEngine, TransferSettings,
};
use hotfolder_telemetry::{LogFormat, LoggingConfig, Metrics, build_sha, init_logging};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::health::HealthTracker;
use crate::poller::Poller;
use crate::router::{Route, Router};

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const LOCKS_ROLE: &str = "locks";
const ELECTION_ROLE: &str = "election";
const ROLES_COMPONENT: &str = "roles";

/// A fully wired hot folder node.
pub struct Node {
    locks: Arc<LockRepository>,
    source: Arc<SynchronizingSource>,
    poller: Arc<Poller>,
    leader: Arc<LeaderInitiator>,
    roles: RoleController,
    cleanup: HistoryCleanup,
    histories: Arc<dyn RecordStore<HistoryRecord>>,
    metrics: Metrics,
    events: EventBus,
    health: HealthTracker,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("roles", &self.roles)
            .field("leader", &self.leader.is_leader())
            .finish_non_exhaustive()
    }
}

fn open_table<R: Record>(data_directory: Option<&Path>) -> AppResult<Arc<dyn RecordStore<R>>> {
    match data_directory {
        Some(dir) => {
            let store =
                JsonFileStore::<R>::open(dir).map_err(|err| AppError::store("tables.open", err))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(MemoryStore::<R>::new())),
    }
}

fn comparator_chain(configs: &[ComparatorConfig]) -> AppResult<ComparatorChain> {
    let mut chain = ComparatorChain::new();
    for config in configs {
        chain = match config.kind {
            ComparatorKind::Name => {
                let pattern = config.pattern.as_deref().unwrap_or("(?<name>.*)");
                let group = config.group.as_deref().unwrap_or("name");
                chain.then(
                    NameComparator::new(pattern, group)
                        .map_err(|err| AppError::sync("comparator.name", err))?,
                )
            }
            ComparatorKind::Timestamp => chain.then(TimestampComparator),
            ComparatorKind::Sequence => {
                let (Some(pattern), Some(group)) = (&config.pattern, &config.group) else {
                    return Err(AppError::InvalidConfig {
                        field: "sync.comparators",
                        reason: "sequence_requires_pattern_and_group",
                        value: None,
                    });
                };
                chain.then(
                    SequenceComparator::new(pattern, group.as_str())
                        .map_err(|err| AppError::sync("comparator.sequence", err))?,
                )
            }
            ComparatorKind::Prefix => {
                chain.then(PrefixComparator::new(config.priority.as_deref().unwrap_or("")))
            }
        };
    }
    Ok(chain)
}

fn parse_statuses(values: &[String]) -> AppResult<Vec<Status>> {
    values
        .iter()
        .map(|value| Status::from_str(value).map_err(|err| AppError::monitor("monitor.levels", err)))
        .collect()
}

fn monitor_service(
    config: &MonitorConfig,
    histories: &Arc<dyn RecordStore<HistoryRecord>>,
    clock: &Arc<dyn Clock>,
    metrics: &Metrics,
    node_id: u32,
) -> AppResult<MonitorService> {
    let levels = LogLevels {
        info: parse_statuses(&config.info_statuses)?,
        warn: parse_statuses(&config.warn_statuses)?,
        error: parse_statuses(&config.error_statuses)?,
    };
    let recorders: Vec<Arc<dyn MonitorRecorder>> = vec![
        Arc::new(CounterRecorder::new(metrics.clone(), config.counter_enabled)),
        Arc::new(TimerRecorder::new(metrics.clone(), config.timer_enabled)),
        Arc::new(HistogramRecorder::new(metrics.clone(), config.histogram_enabled)),
        Arc::new(LoggingRecorder::new(levels, config.logging_enabled)),
        Arc::new(DatabaseRecorder::new(
            Arc::clone(histories),
            Arc::clone(clock),
            config.database_enabled,
        )),
    ];
    let restorer: Arc<dyn HistoryRestorer> = if config.database_enabled {
        Arc::new(DatabaseRestorer::new(Arc::clone(histories)))
    } else {
        Arc::new(FreshRestorer)
    };
    Ok(MonitorService::new(
        Arc::new(CompoundRecorder::new(recorders)),
        restorer,
        node_id,
    ))
}

fn history_cleanup(
    config: &MonitorConfig,
    histories: &Arc<dyn RecordStore<HistoryRecord>>,
) -> AppResult<HistoryCleanup> {
    let status = Status::from_str(&config.cleanup_status)
        .map_err(|err| AppError::monitor("monitor.cleanup_status", err))?;
    let condition = match config.cleanup_condition {
        CleanupCondition::Eq => StatusCondition::Equal,
        CleanupCondition::Ne => StatusCondition::NotEqual,
    };
    Ok(HistoryCleanup::new(
        Arc::clone(histories),
        config.cleanup_threshold_days,
        status,
        condition,
    ))
}

impl Node {
    /// Wire every component described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error when a table cannot be opened, a pattern or status does not parse,
    /// or the local directory cannot be prepared.
    pub fn build(
        config: &HotfolderConfig,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        events: EventBus,
    ) -> AppResult<Self> {
        let node_id = config.node.node_id;
        let data_directory = config.storage.data_directory.as_deref();
        let lock_rows = open_table::<LockRecord>(data_directory)?;
        let metadata_rows = open_table::<MetadataRecord>(data_directory)?;
        let histories = open_table::<HistoryRecord>(data_directory)?;

        let locks = Arc::new(LockRepository::new(
            lock_rows,
            Arc::clone(&clock),
            LockSettings {
                region: config.locks.region.clone(),
                node_id,
                ttl: config.locks.ttl(),
            },
        ));
        let registry = LockRegistry::new(Arc::clone(&locks));

        let metadata: Arc<dyn MetadataStore> = match config.dedup.backend {
            DedupBackend::Locked => Arc::new(LockedMetadataStore::new(
                metadata_rows,
                registry.clone(),
                Arc::clone(&clock),
                config.dedup.region.clone(),
            )),
            DedupBackend::Expiring => Arc::new(ExpiringMetadataStore::new(
                config.dedup.expiring_max_size,
                config.dedup.expiring_ttl(),
                Arc::clone(&clock),
            )),
        };

        let sync = &config.sync;
        let mut members: Vec<Arc<dyn FileListFilter>> = Vec::new();
        if let Some(pattern) = sync.filename_pattern.as_deref() {
            members.push(Arc::new(
                RegexPatternFilter::new(pattern)
                    .map_err(|err| AppError::sync("filter.pattern", err))?,
            ));
        }
        members.push(Arc::new(AcceptOnceFilter::new(
            metadata,
            config.dedup.key_prefix.clone(),
        )));
        let filter: Arc<dyn FileListFilter> = Arc::new(ChainFilter::new(members));

        let names: Arc<dyn LocalNameGenerator> = match sync.local_filename {
            LocalFilename::Remote => Arc::new(RemoteNames),
            LocalFilename::Timestamp => Arc::new(TimestampNames::new(Arc::clone(&clock))),
        };
        let settings = TransferSettings {
            temporary_suffix: sync.temporary_file_suffix.clone(),
            disposition: RemoteDisposition::from_settings(
                sync.move_to_remote_directory.as_deref(),
                sync.delete_remote_files,
            ),
            preserve_timestamp: sync.preserve_timestamp,
        };

        let monitor = monitor_service(&config.monitor, &histories, &clock, &metrics, node_id)?;
        let remote = Arc::new(FsRemote::new(sync.remote_root.clone()));
        let engine = TransferEngine::new(
            remote.clone(),
            Arc::clone(&filter),
            names,
            Arc::clone(&clock),
            settings,
        )
        .with_monitor(monitor.clone());

        let mut synchronizer = Synchronizer::new(
            remote,
            filter,
            engine,
            metrics.clone(),
            events.clone(),
            sync.remote_directory.clone(),
        );
        let chain = comparator_chain(&sync.comparators)?;
        if !chain.is_empty() {
            synchronizer = synchronizer.with_comparator(Arc::new(chain));
        }
        let source = Arc::new(
            SynchronizingSource::new(
                synchronizer,
                sync.local_directory.clone(),
                sync.auto_create_local_directory,
                sync.max_fetch_size,
            )
            .map_err(|err| AppError::sync("source.new", err))?,
        );

        let routes = config
            .routes
            .iter()
            .map(Route::from_config)
            .collect::<AppResult<Vec<_>>>()?;
        let router = Router::new(routes, monitor, Arc::clone(&clock));
        let health = HealthTracker::new(events.clone());
        let poller = Arc::new(Poller::new(
            Arc::clone(&source),
            router,
            sync.poll_interval(),
            health.clone(),
        ));

        let election = &config.election;
        let leader = Arc::new(LeaderInitiator::new(
            LeaderSettings {
                role: election.role.clone(),
                lock_key: election.lock_key.clone(),
                tenant: config.node.tenant.clone(),
                node_id,
                heartbeat: election.heartbeat(),
                busy_wait: election.busy_wait(),
                stop_timeout: election.stop_timeout(),
            },
            registry,
            poller.clone(),
            events.clone(),
            metrics.clone(),
        ));

        let mut roles = RoleController::new();
        roles.register(LOCKS_ROLE, locks.clone());
        roles.register(ELECTION_ROLE, leader.clone());

        let cleanup = history_cleanup(&config.monitor, &histories)?;
        info!(node_id, role = %election.role, "node assembled");
        Ok(Self {
            locks,
            source,
            poller,
            leader,
            roles,
            cleanup,
            histories,
            metrics,
            events,
            health,
        })
    }

    /// Start the lock repository and join the election.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Startup`] when any lifecycle failed to start.
    pub fn start(&self) -> AppResult<()> {
        let failed = self.roles.start_all();
        if failed > 0 {
            self.health
                .mark_degraded(ROLES_COMPONENT, &format!("{failed} lifecycles failed to start"));
            return Err(AppError::Startup { failed });
        }
        self.health.mark_recovered(ROLES_COMPONENT);
        info!(roles = ?self.roles.roles(), "node started");
        Ok(())
    }

    /// Leave the election, stopping the poller if leading, then release held locks.
    pub fn stop(&self) {
        let failed = self.roles.stop_all();
        if failed > 0 {
            warn!(failed, "some lifecycles did not stop cleanly");
            self.health
                .mark_degraded(ROLES_COMPONENT, &format!("{failed} lifecycles failed to stop"));
        }
        info!(locks_running = self.locks.is_running(), "node stopped");
    }

    /// Remove expired histories as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error when the history table cannot be written.
    pub fn run_cleanup(&self, now: DateTime<Utc>) -> AppResult<usize> {
        self.cleanup
            .cleanup(now)
            .map_err(|err| AppError::monitor("monitor.cleanup", err))
    }

    /// Current metrics in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error when the registry cannot be encoded.
    pub fn metrics_exposition(&self) -> AppResult<String> {
        self.metrics
            .render()
            .map_err(|err| AppError::telemetry("telemetry.render", err))
    }

    /// Source feeding the poller.
    #[must_use]
    pub const fn source(&self) -> &Arc<SynchronizingSource> {
        &self.source
    }

    /// Poller gated by the election.
    #[must_use]
    pub const fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    /// Election for the configured role.
    #[must_use]
    pub const fn leader(&self) -> &Arc<LeaderInitiator> {
        &self.leader
    }

    /// History table.
    #[must_use]
    pub const fn histories(&self) -> &Arc<dyn RecordStore<HistoryRecord>> {
        &self.histories
    }

    /// Metrics registry shared by every component.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Event bus shared by every component.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Degraded-component tracker.
    #[must_use]
    pub const fn health(&self) -> &HealthTracker {
        &self.health
    }
}

/// Entry point for the hot folder node boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, logging, assembly, or startup fails.
pub async fn run_app() -> AppResult<()> {
    let config =
        hotfolder_config::load_from_env().map_err(|err| AppError::config("config.load", err))?;
    init_logging(&LoggingConfig {
        level: &config.logging.level,
        format: LogFormat::from_name(config.logging.format.as_deref()),
        build_sha: build_sha(),
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    info!(node_id = config.node.node_id, tenant = %config.node.tenant, "hot folder node bootstrap starting");

    let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let node = Arc::new(Node::build(&config, Arc::clone(&clock), metrics, EventBus::new())?);

    let starting = Arc::clone(&node);
    tokio::task::spawn_blocking(move || starting.start())
        .await
        .map_err(|source| AppError::Join {
            task: "node.start",
            source,
        })??;

    let event_task = spawn_event_log(node.events());
    let cleanup_task = spawn_cleanup(Arc::clone(&node), clock);

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::io("signal.ctrl_c", None, err))?;
    info!("shutdown requested");

    cleanup_task.abort();
    event_task.abort();
    let stopping = Arc::clone(&node);
    tokio::task::spawn_blocking(move || stopping.stop())
        .await
        .map_err(|source| AppError::Join {
            task: "node.stop",
            source,
        })?;
    info!("hot folder node shut down");
    Ok(())
}

fn spawn_event_log(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut stream = events.subscribe(None);
    tokio::spawn(async move {
        while let Some(envelope) = stream.next().await {
            info!(event_id = envelope.id, kind = envelope.event.kind(), "event");
        }
    })
}

fn spawn_cleanup(node: Arc<Node>, clock: Arc<dyn Clock>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            let now = clock.now();
            let ticking = Arc::clone(&node);
            match tokio::task::spawn_blocking(move || ticking.run_cleanup(now)).await {
                Ok(Ok(removed)) => info!(removed, "history cleanup finished"),
                Ok(Err(err)) => warn!(error = %err, "history cleanup failed"),
                Err(err) => warn!(error = %err, "history cleanup task failed"),
            }
            match node.metrics_exposition() {
                Ok(exposition) => info!(metrics = %exposition, "metrics snapshot"),
                Err(err) => warn!(error = %err, "metrics snapshot failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn comparator(kind: ComparatorKind) -> ComparatorConfig {
        ComparatorConfig {
            kind,
            pattern: None,
            group: None,
            priority: None,
        }
    }

    #[test]
    fn comparator_chain_follows_configuration() -> Result<()> {
        assert!(comparator_chain(&[])?.is_empty());
        let chain = comparator_chain(&[
            comparator(ComparatorKind::Prefix),
            comparator(ComparatorKind::Name),
            comparator(ComparatorKind::Timestamp),
        ])?;
        assert!(!chain.is_empty());
        Ok(())
    }

    #[test]
    fn sequence_comparator_requires_pattern_and_group() {
        assert!(matches!(
            comparator_chain(&[comparator(ComparatorKind::Sequence)]),
            Err(AppError::InvalidConfig {
                reason: "sequence_requires_pattern_and_group",
                ..
            })
        ));
    }

    #[test]
    fn unknown_log_status_is_rejected() {
        let statuses = vec!["SUCCESS".to_string(), "MAYBE".to_string()];
        assert!(matches!(
            parse_statuses(&statuses),
            Err(AppError::Monitor {
                operation: "monitor.levels",
                ..
            })
        ));
    }
}
