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

//! Durable record store consumed by the lock, dedup, and history layers.
//!
//! Layout: `record.rs` (record contract and the `RecordStore` capability),
//! `memory.rs` (process-local tables), `file.rs` (JSON-file backed tables),
//! `clock.rs` (wall clock abstraction shared by TTL logic).

pub mod clock;
pub mod error;
pub mod file;
pub mod memory;
pub mod record;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use record::{Record, RecordFilter, RecordId, RecordStore, Stored};
