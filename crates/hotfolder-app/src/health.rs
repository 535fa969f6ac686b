//! Degraded-component tracking published as [`Event::HealthChanged`].
//!
//! # Design
//! - The tracker holds the set of degraded component names; an event is published only
//!   when that set changes, carrying the full set.
//! - Repeated degradation of an already degraded component is logged, not republished.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use hotfolder_events::{Event, EventBus};
use tracing::{error, info, warn};

/// Shared view of which node components are degraded.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    events: EventBus,
    degraded: Arc<Mutex<BTreeSet<String>>>,
}

impl HealthTracker {
    /// Tracker publishing changes on `events`.
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            degraded: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Flag `component` as degraded.
    pub fn mark_degraded(&self, component: &str, detail: &str) {
        let mut guard = self.lock_degraded();
        if guard.insert(component.to_string()) {
            let degraded: Vec<String> = guard.iter().cloned().collect();
            drop(guard);
            warn!(component, detail, "component degraded");
            self.events.publish(Event::HealthChanged { degraded });
        } else {
            drop(guard);
            warn!(component, detail, "component still degraded");
        }
    }

    /// Clear the degraded flag of `component`.
    pub fn mark_recovered(&self, component: &str) {
        let mut guard = self.lock_degraded();
        if guard.remove(component) {
            let degraded: Vec<String> = guard.iter().cloned().collect();
            drop(guard);
            info!(component, "component recovered");
            self.events.publish(Event::HealthChanged { degraded });
        }
    }

    /// Components currently degraded, sorted by name.
    #[must_use]
    pub fn degraded(&self) -> Vec<String> {
        self.lock_degraded().iter().cloned().collect()
    }

    fn lock_degraded(&self) -> MutexGuard<'_, BTreeSet<String>> {
        match self.degraded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("health mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}
