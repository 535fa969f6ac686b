//! Local file name generators.

use std::fmt::Debug;
use std::sync::Arc;

use hotfolder_store::Clock;

/// Maps a remote file name to the local file name.
pub trait LocalNameGenerator: Send + Sync + Debug {
    /// Local name for `remote_name`.
    fn local_name(&self, remote_name: &str) -> String;
}

/// Keeps the remote name.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteNames;

impl LocalNameGenerator for RemoteNames {
    fn local_name(&self, remote_name: &str) -> String {
        remote_name.to_string()
    }
}

/// Appends a UTC timestamp, e.g. `a.csv.2024-05-01T10-15-30.250Z`.
#[derive(Debug, Clone)]
pub struct TimestampNames {
    clock: Arc<dyn Clock>,
}

impl TimestampNames {
    /// Generator stamping names with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl LocalNameGenerator for TimestampNames {
    fn local_name(&self, remote_name: &str) -> String {
        let stamp = self.clock.now().format("%Y-%m-%dT%H-%M-%S%.3fZ");
        format!("{remote_name}.{stamp}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};
    use hotfolder_store::ManualClock;

    #[test]
    fn timestamp_names_replace_colons() {
        let clock = ManualClock::new(DateTime::<Utc>::UNIX_EPOCH);
        clock.advance(TimeDelta::milliseconds(86_400_000 + 3_723_045));
        let names = TimestampNames::new(Arc::new(clock));
        assert_eq!(
            names.local_name("a.csv"),
            "a.csv.1970-01-02T01-02-03.045Z"
        );
        assert_eq!(RemoteNames.local_name("a.csv"), "a.csv");
    }
}
