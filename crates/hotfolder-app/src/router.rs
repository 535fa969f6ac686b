//! Routing stage: move each transferred file into the directory of the first matching
//! route and close its history.
//!
//! # Design
//! - The history opened by the transfer is resumed by the same key, so routing appends to
//!   the download step even after a restart.
//! - An unmatched file is not an error: the history ends with a warning and the local
//!   copy is deleted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hotfolder_config::RouteConfig;
use hotfolder_monitor::{MonitorService, Status, Step, SystemArea};
use hotfolder_store::Clock;
use hotfolder_sync::TransferredFile;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// One compiled routing rule.
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    pattern: Regex,
    directory: PathBuf,
}

impl Route {
    /// Compile a route from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidConfig`] when the pattern is not a valid regex.
    pub fn from_config(config: &RouteConfig) -> AppResult<Self> {
        let pattern = Regex::new(&config.pattern).map_err(|_| AppError::InvalidConfig {
            field: "routes.pattern",
            reason: "invalid_regex",
            value: Some(config.pattern.clone()),
        })?;
        Ok(Self {
            name: config.name.clone(),
            pattern,
            directory: config.directory.clone(),
        })
    }

    /// Route name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, file_name: &str) -> bool {
        self.pattern.is_match(file_name)
    }
}

/// Where a file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Moved into the directory of the named route.
    Routed {
        /// Route that matched.
        route: String,
        /// New location of the file.
        path: PathBuf,
    },
    /// No route matched; the local file was deleted.
    Unmatched,
}

/// Applies the routing table to transferred files.
pub struct Router {
    routes: Vec<Route>,
    monitor: MonitorService,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

/// History key shared by the transfer and routing stages.
#[must_use]
pub fn history_key(file: &TransferredFile) -> String {
    format!("{}{}", file.remote.name, file.remote.modified)
}

impl Router {
    /// Router over `routes`, first match wins.
    #[must_use]
    pub fn new(routes: Vec<Route>, monitor: MonitorService, clock: Arc<dyn Clock>) -> Self {
        Self {
            routes,
            monitor,
            clock,
        }
    }

    /// Route `file` and end its history.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be moved into the route directory; the
    /// history is ended with a failure first.
    pub fn route(&self, file: &TransferredFile) -> AppResult<RouteOutcome> {
        let mut history = self.monitor.resume(SystemArea::HotFolder, &history_key(file));
        let started = self.clock.now();
        let file_name = file
            .local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some(route) = self.routes.iter().find(|route| route.matches(&file_name)) else {
            history.step_failed(
                Step::FileRouted,
                Some(started),
                Some(self.clock.now()),
                None,
                format!("No route found for file [{file_name}]"),
            );
            history.end(Status::Warning);
            warn!(file = %file_name, "no route matched; deleting local file");
            if let Err(err) = fs::remove_file(&file.local_path) {
                warn!(error = %err, path = %file.local_path.display(), "failed to delete unrouted file");
            }
            return Ok(RouteOutcome::Unmatched);
        };

        match move_into(&file.local_path, &route.directory, &file_name) {
            Ok(path) => {
                history.step_succeeded(
                    Step::FileRouted,
                    Some(started),
                    Some(self.clock.now()),
                    format!("Routed file [{file_name}] to [{}]", route.name),
                );
                history.end(Status::Success);
                info!(file = %file_name, route = %route.name, "file routed");
                Ok(RouteOutcome::Routed {
                    route: route.name.clone(),
                    path,
                })
            }
            Err(err) => {
                history.step_failed(
                    Step::FileRouted,
                    Some(started),
                    Some(self.clock.now()),
                    Some(&err as &(dyn std::error::Error + 'static)),
                    format!("Failed to route file [{file_name}] to [{}]", route.name),
                );
                history.end(Status::Failure);
                Err(err)
            }
        }
    }
}

fn move_into(source: &Path, directory: &Path, file_name: &str) -> AppResult<PathBuf> {
    fs::create_dir_all(directory)
        .map_err(|err| AppError::io("route.create_directory", Some(directory.to_path_buf()), err))?;
    let target = directory.join(file_name);
    fs::rename(source, &target)
        .map_err(|err| AppError::io("route.move", Some(source.to_path_buf()), err))?;
    debug!(from = %source.display(), to = %target.display(), "moved file");
    Ok(target)
}
