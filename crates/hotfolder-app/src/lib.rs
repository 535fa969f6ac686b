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

//! Hot folder node wiring.
//!
//! Layout: `bootstrap.rs` (configuration to components, run loop), `router.rs` (routing
//! stage), `poller.rs` (leader-gated polling lifecycle), `health.rs` (degraded components),
//! `error.rs` (application errors).

/// Component wiring and the async run loop.
pub mod bootstrap;
/// Application error type.
pub mod error;
/// Degraded-component tracking.
pub mod health;
/// Polling lifecycle started on leadership.
pub mod poller;
/// Routing of transferred files to their processing directories.
pub mod router;

pub use bootstrap::{Node, run_app};
pub use error::{AppError, AppResult};
pub use health::HealthTracker;
pub use poller::Poller;
pub use router::{Route, RouteOutcome, Router};
