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

//! Cluster coordination primitives built on the durable record store.
//!
//! Layout: `lock.rs` (lease lock repository), `registry.rs` (RAII lock guards),
//! `metadata.rs` (dedup metadata stores), `leader.rs` (leader election initiator),
//! `lifecycle.rs` (start/stop contract and role controller).

pub mod error;
pub mod leader;
pub mod lifecycle;
pub mod lock;
pub mod metadata;
pub mod registry;

pub use error::{CoordError, CoordResult};
pub use leader::{LeaderInitiator, LeaderSettings};
pub use lifecycle::{Lifecycle, RoleController};
pub use lock::{DEFAULT_LOCK_REGION, DEFAULT_LOCK_TTL, LockRecord, LockRepository, LockSettings};
pub use metadata::{
    ExpiringMetadataStore, LockedMetadataStore, MetadataRecord, MetadataStore, PutIfAbsent,
};
pub use registry::{LockGuard, LockRegistry};
