//! Serialized scrollback snapshots
//!
//! Bounded both by entry count and by total bytes. Oldest snapshots are
//! evicted first; updating a key moves it to the newest position.

use lru::LruCache;
use termdeck_protocol::TerminalId;

/// Snapshot cache with a running byte total
pub(super) struct SerializedBuffers {
    entries: LruCache<TerminalId, String>,
    total_bytes: usize,
    max_entries: usize,
    max_entry_bytes: usize,
    max_total_bytes: usize,
}

/// Result of storing a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum StoreOutcome {
    Stored { evicted: Vec<TerminalId> },
    /// The snapshot exceeded the per-entry cap and was not cached
    Rejected,
}

impl SerializedBuffers {
    pub(super) fn new(max_entries: usize, max_entry_bytes: usize, max_total_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_bytes: 0,
            max_entries,
            max_entry_bytes,
            max_total_bytes,
        }
    }

    pub(super) fn set(&mut self, terminal_id: TerminalId, data: String) -> StoreOutcome {
        // A superseded snapshot is dropped even when the new one is rejected
        self.remove(terminal_id);

        if data.len() > self.max_entry_bytes {
            return StoreOutcome::Rejected;
        }

        self.total_bytes += data.len();
        self.entries.push(terminal_id, data);

        let mut evicted = Vec::new();
        while self.entries.len() > self.max_entries || self.total_bytes > self.max_total_bytes {
            match self.entries.pop_lru() {
                Some((id, old)) => {
                    self.total_bytes -= old.len();
                    evicted.push(id);
                }
                None => break,
            }
        }
        StoreOutcome::Stored { evicted }
    }

    /// Get and delete
    pub(super) fn take(&mut self, terminal_id: TerminalId) -> Option<String> {
        let data = self.entries.pop(&terminal_id)?;
        self.total_bytes -= data.len();
        Some(data)
    }

    pub(super) fn peek(&self, terminal_id: TerminalId) -> Option<&str> {
        self.entries.peek(&terminal_id).map(String::as_str)
    }

    pub(super) fn remove(&mut self, terminal_id: TerminalId) -> bool {
        self.take(terminal_id).is_some()
    }

    pub(super) fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}
