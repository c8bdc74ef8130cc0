//! Bounded in-memory audit ring, one deque per interface.
//!
//! Entries live for the process lifetime only. Newest first, tail-drop at
//! [`AUDIT_CAPACITY`]. Pagination cursors are entry ids; paging resumes
//! immediately after the cursor.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Entries retained per interface.
pub const AUDIT_CAPACITY: usize = 500;

/// One recorded mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Monotonic id, unique per process.
    pub id: u64,
    /// When the mutation was recorded.
    pub timestamp: DateTime<Utc>,
    /// Dotted action name, e.g. `peer.add`, `interface.toggle`.
    pub action: String,
    /// Structured context for the action.
    pub detail: serde_json::Value,
}

/// One page of audit entries, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    /// The entries.
    pub items: Vec<AuditEntry>,
    /// Cursor for the next page; present only when this page was full.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<u64>,
}

/// The ring itself.
#[derive(Debug, Default)]
pub struct AuditRing {
    next_id: AtomicU64,
    rings: Mutex<HashMap<String, VecDeque<AuditEntry>>>,
}

impl AuditRing {
    /// Creates an empty ring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one entry against an interface.
    pub fn record(&self, interface: &str, action: &str, detail: serde_json::Value) {
        let entry = AuditEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            timestamp: Utc::now(),
            action: action.to_string(),
            detail,
        };
        let mut rings = self.rings.lock();
        let ring = rings.entry(interface.to_string()).or_default();
        ring.push_front(entry);
        ring.truncate(AUDIT_CAPACITY);
    }

    /// Reads a page, newest first, starting after `cursor` when given.
    #[must_use]
    pub fn page(&self, interface: &str, limit: usize, cursor: Option<u64>) -> AuditPage {
        let rings = self.rings.lock();
        let Some(ring) = rings.get(interface) else {
            return AuditPage {
                items: Vec::new(),
                next_cursor: None,
            };
        };

        let start = match cursor {
            Some(cursor) => ring
                .iter()
                .position(|e| e.id == cursor)
                .map_or(ring.len(), |pos| pos + 1),
            None => 0,
        };

        let items: Vec<AuditEntry> = ring.iter().skip(start).take(limit).cloned().collect();
        let next_cursor = (items.len() == limit)
            .then(|| items.last().map(|e| e.id))
            .flatten();

        AuditPage { items, next_cursor }
    }

    /// Number of retained entries for an interface.
    #[must_use]
    pub fn len(&self, interface: &str) -> usize {
        self.rings.lock().get(interface).map_or(0, VecDeque::len)
    }

    /// Whether an interface has no entries.
    #[must_use]
    pub fn is_empty(&self, interface: &str) -> bool {
        self.len(interface) == 0
    }
}
