//! Ordering strategies for remote listings and their first-non-equal composition.
//!
//! # Design
//! - Each strategy extracts one sort key from the item name or timestamp.
//! - Items a sequence or prefix strategy cannot classify sort last.
//! - Patterns must match the whole name, mirroring filename conventions such as
//!   `orders-(?<seq>\d+)\.csv`.

use std::cmp::Ordering;
use std::fmt::Debug;

use regex::{Captures, Regex};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteItem;

/// Orders two remote items.
pub trait ItemComparator: Send + Sync + Debug {
    /// Compare `a` with `b`.
    fn compare(&self, a: &RemoteItem, b: &RemoteItem) -> Ordering;
}

fn full_match<'t>(pattern: &Regex, name: &'t str) -> Option<Captures<'t>> {
    pattern
        .captures(name)
        .filter(|caps| caps.get(0).is_some_and(|whole| whole.start() == 0 && whole.end() == name.len()))
}

fn compile(pattern: &str) -> SyncResult<Regex> {
    Regex::new(pattern).map_err(|source| SyncError::pattern(pattern, source))
}

/// Orders by a named capture group of the file name; non-matching names sort as empty.
#[derive(Debug, Clone)]
pub struct NameComparator {
    pattern: Regex,
    group: String,
}

impl NameComparator {
    /// Comparator extracting `group` from names matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error when `pattern` is not a valid regex.
    pub fn new(pattern: &str, group: impl Into<String>) -> SyncResult<Self> {
        Ok(Self {
            pattern: compile(pattern)?,
            group: group.into(),
        })
    }

    fn key<'a>(&self, name: &'a str) -> &'a str {
        full_match(&self.pattern, name)
            .and_then(|caps| caps.name(&self.group))
            .map_or("", |group| group.as_str())
    }
}

impl ItemComparator for NameComparator {
    fn compare(&self, a: &RemoteItem, b: &RemoteItem) -> Ordering {
        self.key(&a.name).cmp(self.key(&b.name))
    }
}

/// Orders by last-modified time, oldest first.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampComparator;

impl ItemComparator for TimestampComparator {
    fn compare(&self, a: &RemoteItem, b: &RemoteItem) -> Ordering {
        a.modified.cmp(&b.modified)
    }
}

/// Orders by an integer sequence captured from the file name.
#[derive(Debug, Clone)]
pub struct SequenceComparator {
    pattern: Regex,
    group: String,
}

impl SequenceComparator {
    /// Comparator reading the sequence from `group` of names matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error when `pattern` is not a valid regex.
    pub fn new(pattern: &str, group: impl Into<String>) -> SyncResult<Self> {
        Ok(Self {
            pattern: compile(pattern)?,
            group: group.into(),
        })
    }

    fn sequence(&self, name: &str) -> i64 {
        let Some(raw) = full_match(&self.pattern, name).and_then(|caps| caps.name(&self.group))
        else {
            return i64::MAX;
        };
        let raw = raw.as_str();
        if raw.contains(['-', '.']) {
            return i64::MAX;
        }
        raw.parse().unwrap_or_else(|_| {
            debug!(name, sequence = raw, "sequence is not a long; sorting last");
            i64::MAX
        })
    }
}

impl ItemComparator for SequenceComparator {
    fn compare(&self, a: &RemoteItem, b: &RemoteItem) -> Ordering {
        self.sequence(&a.name).cmp(&self.sequence(&b.name))
    }
}

/// Orders by the position of the first configured prefix the name starts with.
#[derive(Debug, Clone)]
pub struct PrefixComparator {
    prefixes: Vec<String>,
}

impl PrefixComparator {
    /// Comparator over a comma-separated priority list; blank entries are ignored.
    #[must_use]
    pub fn new(priority: &str) -> Self {
        Self {
            prefixes: priority
                .split(',')
                .map(str::trim)
                .filter(|prefix| !prefix.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    fn priority(&self, name: &str) -> usize {
        self.prefixes
            .iter()
            .position(|prefix| name.starts_with(prefix.as_str()))
            .unwrap_or(usize::MAX)
    }
}

impl ItemComparator for PrefixComparator {
    fn compare(&self, a: &RemoteItem, b: &RemoteItem) -> Ordering {
        self.priority(&a.name).cmp(&self.priority(&b.name))
    }
}

/// Applies members in order; the first non-equal result wins.
#[derive(Debug, Default)]
pub struct ComparatorChain {
    members: Vec<Box<dyn ItemComparator>>,
}

impl ComparatorChain {
    /// Empty chain; every pair compares equal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a member.
    #[must_use]
    pub fn then(mut self, member: impl ItemComparator + 'static) -> Self {
        self.members.push(Box::new(member));
        self
    }

    /// Whether the chain has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl ItemComparator for ComparatorChain {
    fn compare(&self, a: &RemoteItem, b: &RemoteItem) -> Ordering {
        self.members
            .iter()
            .map(|member| member.compare(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn item(name: &str, modified: i64) -> RemoteItem {
        RemoteItem::file("inbound", name, 1, modified)
    }

    fn sorted(chain: &dyn ItemComparator, mut items: Vec<RemoteItem>) -> Vec<String> {
        items.sort_by(|a, b| chain.compare(a, b));
        items.into_iter().map(|item| item.name).collect()
    }

    #[test]
    fn sequence_orders_numerically_and_unparsable_last() -> Result<()> {
        let comparator = SequenceComparator::new(r"orders-(?<seq>[^_]+)\.csv", "seq")?;
        let items = vec![
            item("orders-10.csv", 0),
            item("orders-1.5.csv", 0),
            item("orders-2.csv", 0),
            item("other.csv", 0),
            item("orders--3.csv", 0),
        ];
        assert_eq!(
            sorted(&comparator, items),
            vec!["orders-2.csv", "orders-10.csv", "orders-1.5.csv", "other.csv", "orders--3.csv"]
        );
        Ok(())
    }

    #[test]
    fn name_uses_group_and_blank_for_partial_matches() -> Result<()> {
        let comparator = NameComparator::new(r"(?<base>[a-z]+)-\d+\.csv", "base")?;
        assert_eq!(comparator.key("prices-1.csv"), "prices");
        assert_eq!(comparator.key("xprices-1.csv.bak"), "");
        assert_eq!(
            comparator.compare(&item("stock-1.csv", 0), &item("prices-9.csv", 0)),
            Ordering::Greater
        );
        Ok(())
    }

    #[test]
    fn prefix_priority_with_unknown_last() {
        let comparator = PrefixComparator::new(" customer, ,product ,price");
        let items = vec![
            item("price-1.csv", 0),
            item("stock-1.csv", 0),
            item("product-1.csv", 0),
            item("customer-1.csv", 0),
        ];
        assert_eq!(
            sorted(&comparator, items),
            vec!["customer-1.csv", "product-1.csv", "price-1.csv", "stock-1.csv"]
        );
    }

    #[test]
    fn chain_falls_through_to_later_members() -> Result<()> {
        let chain = ComparatorChain::new()
            .then(PrefixComparator::new("product,price"))
            .then(SequenceComparator::new(r"[a-z]+-(?<seq>\d+)\.csv", "seq")?)
            .then(TimestampComparator);
        let items = vec![
            item("price-2.csv", 5),
            item("product-2.csv", 9),
            item("price-1.csv", 5),
            item("product-2.csv", 1),
        ];
        let mut ordered = items;
        ordered.sort_by(|a, b| chain.compare(a, b));
        let keys: Vec<_> = ordered.iter().map(|i| (i.name.as_str(), i.modified)).collect();
        assert_eq!(
            keys,
            vec![
                ("product-2.csv", 1),
                ("product-2.csv", 9),
                ("price-1.csv", 5),
                ("price-2.csv", 5),
            ]
        );
        assert!(!chain.is_empty());
        assert_eq!(
            ComparatorChain::new().compare(&item("a", 1), &item("b", 2)),
            Ordering::Equal
        );
        Ok(())
    }

    #[test]
    fn invalid_pattern_is_reported() {
        assert!(matches!(
            SequenceComparator::new("(", "seq"),
            Err(SyncError::Pattern { .. })
        ));
    }
}
