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

//! Remote-to-local synchronization for the hot folder.
//!
//! Layout: `remote.rs` (remote storage capability), `compare.rs` (listing order),
//! `filter.rs` (selection and accept-once dedup), `naming.rs` (local names),
//! `transfer.rs` (per-item transfer), `synchronizer.rs` (one cycle with rollback),
//! `source.rs` (pull-style source lifecycle).

pub mod compare;
pub mod error;
pub mod filter;
pub mod naming;
pub mod remote;
pub mod source;
pub mod synchronizer;
pub mod transfer;

pub use compare::{
    ComparatorChain, ItemComparator, NameComparator, PrefixComparator, SequenceComparator,
    TimestampComparator,
};
pub use error::{SyncError, SyncResult};
pub use filter::{AcceptOnceFilter, ChainFilter, FileListFilter, RegexPatternFilter};
pub use naming::{LocalNameGenerator, RemoteNames, TimestampNames};
pub use remote::{FsRemote, REMOTE_SEPARATOR, RemoteItem, RemoteStorage, join_remote};
pub use source::SynchronizingSource;
pub use synchronizer::Synchronizer;
pub use transfer::{
    DEFAULT_TEMPORARY_SUFFIX, RemoteDisposition, TransferEngine, TransferOutcome,
    TransferSettings, TransferredFile,
};
