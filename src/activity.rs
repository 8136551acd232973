//! Rolling in-memory activity buffer.
//!
//! No persistent event log beyond this bounded deque of recent dispatches,
//! modeled after the shape of `eric8810-authy/src/audit/mod.rs`'s
//! `AuditEntry` (timestamp, operation, actor, outcome, detail) minus the
//! hash-chain and on-disk persistence, which are not carried over.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

const CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Bounded ring buffer of recent dispatches, exposed read-only under
/// `server.activity`. Oldest entries are dropped once `CAPACITY` is reached.
pub struct ActivityLog {
    entries: Mutex<VecDeque<ActivityEntry>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(CAPACITY)),
        }
    }

    pub fn record(&self, method: &str, outcome: &'static str, detail: Option<String>) {
        let mut entries = self.entries.lock().expect("activity log mutex poisoned");
        if entries.len() == CAPACITY {
            entries.pop_front();
        }
        entries.push_back(ActivityEntry {
            timestamp: Utc::now(),
            method: method.to_string(),
            outcome,
            detail,
        });
    }

    /// Most recent entries first.
    pub fn recent(&self, limit: usize) -> Vec<ActivityEntry> {
        let entries = self.entries.lock().expect("activity log mutex poisoned");
        entries.iter().rev().take(limit).cloned().collect()
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

    #[test]
    fn records_are_returned_newest_first() {
        let log = ActivityLog::new();
        log.record("a.one", "success", None);
        log.record("a.two", "error", Some("boom".into()));
        let recent = log.recent(10);
        assert_eq!(recent[0].method, "a.two");
        assert_eq!(recent[1].method, "a.one");
    }

    #[test]
    fn buffer_is_bounded() {
        let log = ActivityLog::new();
        for i in 0..(CAPACITY + 10) {
            log.record(&format!("m.{i}"), "success", None);
        }
        assert_eq!(log.recent(usize::MAX).len(), CAPACITY);
        // Oldest entries (m.0..m.9) were evicted.
        assert!(log.recent(usize::MAX).iter().all(|e| e.method != "m.0"));
    }
}
