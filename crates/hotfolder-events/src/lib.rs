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

//! Event bus for hot folder coordination and synchronization outcomes.
//!
//! The bus assigns sequential identifiers and keeps a bounded replay buffer so late
//! subscribers can catch up. Internally it uses `tokio::broadcast`; when the channel
//! overflows the oldest events are dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::error;

/// Identifier assigned to each published event.
pub type EventId = u64;

const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced across the workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// This node became leader for a role.
    LeadershipGranted {
        /// Role the election was held for.
        role: String,
        /// Cluster node that won.
        node_id: u32,
    },
    /// This node gave up or lost leadership for a role.
    LeadershipRevoked {
        /// Role the election was held for.
        role: String,
        /// Cluster node that stepped down.
        node_id: u32,
    },
    /// A synchronization cycle fetched items to the local directory.
    ItemsSynchronized {
        /// Remote directory that was listed.
        remote_directory: String,
        /// Number of items transferred in the cycle.
        count: usize,
    },
    /// A synchronization cycle failed.
    SyncFailed {
        /// Remote directory that was listed.
        remote_directory: String,
        /// Rendered error.
        message: String,
    },
    /// Set of degraded components changed.
    HealthChanged {
        /// Components currently degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LeadershipGranted { .. } => "leadership_granted",
            Self::LeadershipRevoked { .. } => "leadership_revoked",
            Self::ItemsSynchronized { .. } => "items_synchronized",
            Self::SyncFailed { .. } => "sync_failed",
            Self::HealthChanged { .. } => "health_changed",
        }
    }
}

/// Event plus its identifier and emission time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}

/// Node-wide bus for coordination events, with a bounded replay window for late subscribers.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a bus whose broadcast channel and replay buffer hold `capacity` events.
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish an event, returning its identifier. Having no subscribers is not an error.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe, replaying buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let backlog = since_id.map_or_else(VecDeque::new, |since| {
            self.lock_buffer()
                .iter()
                .filter(|item| item.id > since)
                .cloned()
                .collect()
        });
        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Identifier of the most recent buffered event.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_buffer().back().map(|event| event.id)
    }

    /// Snapshot of the replay buffer, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<EventEnvelope> {
        self.lock_buffer().iter().cloned().collect()
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("event buffer mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream yielding events from the replay backlog first, then from the live channel.
#[derive(Debug)]
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event; `None` once the bus is dropped.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
