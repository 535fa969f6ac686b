//! Remote listing filters, including the persistent accept-once filter.
//!
//! # Design
//! - Filters see the ordered listing and keep relative order.
//! - Reversible filters can un-accept items so a later cycle retries them; the
//!   synchronizer calls `rollback` with the suffix it did not process.
//! - The accept-once filter fails closed: any metadata store error rejects the item.

use std::sync::Arc;

use hotfolder_coord::{MetadataStore, PutIfAbsent};
use regex::Regex;
use tracing::{debug, error, warn};

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteItem;

/// Decides which listed items are eligible for transfer.
pub trait FileListFilter: Send + Sync {
    /// Whether `item` is accepted.
    fn accept(&self, item: &RemoteItem) -> bool;

    /// Accepted items of `items`, in order.
    fn filter(&self, items: Vec<RemoteItem>) -> Vec<RemoteItem> {
        items.into_iter().filter(|item| self.accept(item)).collect()
    }

    /// Whether `rollback` and `remove` have any effect.
    fn supports_rollback(&self) -> bool {
        false
    }

    /// Un-accept every item in `items`.
    fn rollback(&self, items: &[RemoteItem]) {
        for item in items {
            self.remove(item);
        }
    }

    /// Un-accept one item, returning whether anything was reverted.
    fn remove(&self, _item: &RemoteItem) -> bool {
        false
    }
}

/// Accepts each (identity, last-modified) pair once across the cluster.
pub struct AcceptOnceFilter {
    store: Arc<dyn MetadataStore>,
    prefix: String,
}

impl std::fmt::Debug for AcceptOnceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceptOnceFilter")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl AcceptOnceFilter {
    /// Filter recording accepted items in `store` under keys starting with `prefix`.
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Metadata key for `item`.
    #[must_use]
    pub fn key(&self, item: &RemoteItem) -> String {
        format!("{}{}", self.prefix, item.path())
    }

    fn token(item: &RemoteItem) -> String {
        item.modified.to_string()
    }
}

impl FileListFilter for AcceptOnceFilter {
    fn accept(&self, item: &RemoteItem) -> bool {
        let key = self.key(item);
        let token = Self::token(item);
        let outcome = self
            .store
            .put_if_absent(&key, &token)
            .and_then(|previous| match previous {
                PutIfAbsent::Absent => Ok(true),
                PutIfAbsent::Present(seen) if seen == token => Ok(false),
                PutIfAbsent::Present(seen) => self.store.replace(&key, &seen, &token),
            });
        match outcome {
            Ok(accepted) => {
                debug!(key = %key, token = %token, accepted, "accept-once decision");
                accepted
            }
            Err(err) => {
                error!(error = %err, key = %key, "accept-once filter failed; rejecting item");
                false
            }
        }
    }

    fn supports_rollback(&self) -> bool {
        true
    }

    fn remove(&self, item: &RemoteItem) -> bool {
        let key = self.key(item);
        match self.store.remove(&key) {
            Ok(previous) => previous.is_some(),
            Err(err) => {
                warn!(error = %err, key = %key, "failed to revert accept-once entry");
                false
            }
        }
    }
}

/// Accepts files whose whole name matches a pattern; directories are rejected.
#[derive(Debug, Clone)]
pub struct RegexPatternFilter {
    pattern: Regex,
}

impl RegexPatternFilter {
    /// Filter over `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error when `pattern` is not a valid regex.
    pub fn new(pattern: &str) -> SyncResult<Self> {
        let anchored = format!("^(?:{pattern})$");
        Ok(Self {
            pattern: Regex::new(&anchored).map_err(|source| SyncError::pattern(pattern, source))?,
        })
    }
}

impl FileListFilter for RegexPatternFilter {
    fn accept(&self, item: &RemoteItem) -> bool {
        item.is_file && self.pattern.is_match(&item.name)
    }
}

/// Runs members in order, each over the previous member's output.
#[derive(Default)]
pub struct ChainFilter {
    members: Vec<Arc<dyn FileListFilter>>,
}

impl std::fmt::Debug for ChainFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainFilter")
            .field("members", &self.members.len())
            .finish()
    }
}

impl ChainFilter {
    /// Chain over `members`.
    #[must_use]
    pub fn new(members: Vec<Arc<dyn FileListFilter>>) -> Self {
        Self { members }
    }
}

impl FileListFilter for ChainFilter {
    fn accept(&self, item: &RemoteItem) -> bool {
        self.members.iter().all(|member| member.accept(item))
    }

    fn filter(&self, items: Vec<RemoteItem>) -> Vec<RemoteItem> {
        self.members
            .iter()
            .fold(items, |remaining, member| member.filter(remaining))
    }

    fn supports_rollback(&self) -> bool {
        self.members.iter().any(|member| member.supports_rollback())
    }

    fn rollback(&self, items: &[RemoteItem]) {
        for member in self.members.iter().filter(|member| member.supports_rollback()) {
            member.rollback(items);
        }
    }

    fn remove(&self, item: &RemoteItem) -> bool {
        self.members
            .iter()
            .filter(|member| member.supports_rollback())
            .fold(false, |reverted, member| member.remove(item) || reverted)
    }
}
