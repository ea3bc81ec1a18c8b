//! Activity log: bounded, human-readable diagnostic lines.
//!
//! Every line is also emitted through `tracing` at info level.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

/// Default number of lines kept.
const DEFAULT_CAPACITY: usize = 500;

/// One recorded line.
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub line: String,
}

/// In-memory ring of recent activity lines.
pub struct ActivityLog {
    entries: RwLock<VecDeque<ActivityEntry>>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    /// Append a line, evicting the oldest when full.
    pub async fn record(&self, line: impl Into<String>) {
        let line = line.into();
        info!(target: "activity", "{line}");

        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(ActivityEntry {
            at: Utc::now(),
            line,
        });
    }

    /// Lines containing `needle`, oldest first.
    pub async fn matching(&self, needle: &str) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.line.contains(needle))
            .map(|e| e.line.clone())
            .collect()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keeps_lines_in_order() {
        let log = ActivityLog::new();
        log.record("one").await;
        log.record("two").await;
        assert_eq!(log.matching("").await, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn evicts_oldest_when_full() {
        let log = ActivityLog::with_capacity(2);
        log.record("a").await;
        log.record("b").await;
        log.record("c").await;
        assert_eq!(log.matching("").await, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn matching_filters_by_substring() {
        let log = ActivityLog::new();
        log.record("Finished task check for https://a").await;
        log.record("Auto response sent").await;
        assert_eq!(log.matching("Finished").await.len(), 1);
        assert!(log.matching("nothing").await.is_empty());
    }
}
