//! Start/stop contract for long-lived components and the role controller that drives them.

use std::sync::Arc;

use tracing::{error, info};

use crate::error::CoordResult;

/// A component with an explicit running state.
pub trait Lifecycle: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Start the component; starting a running component is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when the component cannot start.
    fn start(&self) -> CoordResult<()>;

    /// Stop the component; stopping a stopped component is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when the component cannot stop cleanly.
    fn stop(&self) -> CoordResult<()>;

    /// Whether the component is running.
    fn is_running(&self) -> bool;
}

/// Lifecycles grouped by role, started in registration order and stopped in reverse.
#[derive(Default)]
pub struct RoleController {
    groups: Vec<(String, Vec<Arc<dyn Lifecycle>>)>,
}

impl std::fmt::Debug for RoleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.groups.iter().map(|(role, members)| (role, members.len())))
            .finish()
    }
}

impl RoleController {
    /// Empty controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `lifecycle` to the group for `role`, creating the group on first use.
    pub fn register(&mut self, role: &str, lifecycle: Arc<dyn Lifecycle>) {
        if let Some((_, members)) = self.groups.iter_mut().find(|(name, _)| name == role) {
            members.push(lifecycle);
        } else {
            self.groups.push((role.to_string(), vec![lifecycle]));
        }
    }

    /// Registered roles in start order.
    #[must_use]
    pub fn roles(&self) -> Vec<&str> {
        self.groups.iter().map(|(role, _)| role.as_str()).collect()
    }

    /// Start every group; returns the number of lifecycles that failed to start.
    pub fn start_all(&self) -> usize {
        self.groups
            .iter()
            .map(|(role, members)| start_group(role, members))
            .sum()
    }

    /// Stop every group in reverse order; returns the number of lifecycles that failed to stop.
    pub fn stop_all(&self) -> usize {
        self.groups
            .iter()
            .rev()
            .map(|(role, members)| stop_group(role, members))
            .sum()
    }

    /// Start the lifecycles registered for `role`.
    pub fn start_role(&self, role: &str) -> usize {
        self.groups
            .iter()
            .filter(|(name, _)| name == role)
            .map(|(name, members)| start_group(name, members))
            .sum()
    }

    /// Stop the lifecycles registered for `role`.
    pub fn stop_role(&self, role: &str) -> usize {
        self.groups
            .iter()
            .filter(|(name, _)| name == role)
            .map(|(name, members)| stop_group(name, members))
            .sum()
    }
}

fn start_group(role: &str, members: &[Arc<dyn Lifecycle>]) -> usize {
    info!(role, count = members.len(), "starting lifecycles in role");
    members
        .iter()
        .filter(|member| {
            member
                .start()
                .inspect_err(|err| {
                    error!(error = %err, role, component = member.name(), "failed to start lifecycle");
                })
                .is_err()
        })
        .count()
}

fn stop_group(role: &str, members: &[Arc<dyn Lifecycle>]) -> usize {
    info!(role, count = members.len(), "stopping lifecycles in role");
    members
        .iter()
        .rev()
        .filter(|member| {
            member
                .stop()
                .inspect_err(|err| {
                    error!(error = %err, role, component = member.name(), "failed to stop lifecycle");
                })
                .is_err()
        })
        .count()
}
