//! Terminal resource cache
//!
//! Two independently bounded caches, owned by one console session:
//!
//! - live terminal surfaces, evicted oldest-first past
//!   [`MAX_CACHED_TERMINALS`]
//! - serialized scrollback snapshots, bounded by count and by total bytes
//!
//! Every surface evicted or replaced here is snapshotted into the second
//! cache before it is disposed, so its content can be restored exactly once
//! with [`TerminalResourceCache::take_serialized_buffer`]. The cache is the
//! only owner allowed to dispose a surface.

mod buffers;
mod surface;

pub use surface::{TerminalSurface, Vt100Surface};

use lru::LruCache;
use termdeck_protocol::TerminalId;

use buffers::{SerializedBuffers, StoreOutcome};

/// Live surfaces kept at once
pub const MAX_CACHED_TERMINALS: usize = 10;
/// Snapshots kept at once
pub const MAX_SERIALIZED_TERMINALS: usize = 30;
/// Largest single snapshot accepted
pub const MAX_SERIALIZE_BYTES: usize = 2 * 1024 * 1024;
/// Byte budget across all snapshots
pub const MAX_TOTAL_SERIALIZED_BYTES: usize = 24 * 1024 * 1024;

/// Bounds for a [`TerminalResourceCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_cached_terminals: usize,
    pub max_serialized_terminals: usize,
    pub max_serialize_bytes: usize,
    pub max_total_serialized_bytes: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_cached_terminals: MAX_CACHED_TERMINALS,
            max_serialized_terminals: MAX_SERIALIZED_TERMINALS,
            max_serialize_bytes: MAX_SERIALIZE_BYTES,
            max_total_serialized_bytes: MAX_TOTAL_SERIALIZED_BYTES,
        }
    }
}

/// Counters exposed for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub cached_terminals: usize,
    pub serialized_terminals: usize,
    pub serialized_bytes: usize,
    pub evictions: u64,
    pub rejected_snapshots: u64,
}

/// Ownership unit for one live terminal surface
pub struct CachedTerminal {
    terminal_id: TerminalId,
    surface: Box<dyn TerminalSurface>,
}

impl CachedTerminal {
    pub fn new(terminal_id: TerminalId, surface: Box<dyn TerminalSurface>) -> Self {
        Self {
            terminal_id,
            surface,
        }
    }

    pub fn terminal_id(&self) -> TerminalId {
        self.terminal_id
    }

    pub fn write(&mut self, data: &[u8]) {
        self.surface.write(data);
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.surface.resize(cols, rows);
    }

    pub fn serialize(&self) -> String {
        self.surface.serialize()
    }

    pub fn search(&self, needle: &str) -> Vec<u16> {
        self.surface.search(needle)
    }

    /// Snapshot, then dispose
    fn release(mut self) -> String {
        let snapshot = self.surface.serialize();
        self.surface.dispose();
        snapshot
    }

    /// Dispose without taking a snapshot
    fn discard(mut self) {
        self.surface.dispose();
    }
}

impl std::fmt::Debug for CachedTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTerminal")
            .field("terminal_id", &self.terminal_id)
            .field("disposed", &self.surface.is_disposed())
            .finish()
    }
}

/// Bounded cache of live surfaces and serialized snapshots
pub struct TerminalResourceCache {
    limits: CacheLimits,
    surfaces: LruCache<TerminalId, CachedTerminal>,
    buffers: SerializedBuffers,
    evictions: u64,
    rejected: u64,
}

impl TerminalResourceCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            limits,
            surfaces: LruCache::unbounded(),
            buffers: SerializedBuffers::new(
                limits.max_serialized_terminals,
                limits.max_serialize_bytes,
                limits.max_total_serialized_bytes,
            ),
            evictions: 0,
            rejected: 0,
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Install a surface, replacing and evicting as needed
    ///
    /// An existing surface under the same id is snapshotted and disposed
    /// first. Returns the ids evicted to stay within bounds.
    pub fn cache_terminal_dom(&mut self, entry: CachedTerminal) -> Vec<TerminalId> {
        let terminal_id = entry.terminal_id;
        if let Some(previous) = self.surfaces.pop(&terminal_id) {
            let snapshot = previous.release();
            self.store_snapshot(terminal_id, snapshot);
        }

        self.surfaces.push(terminal_id, entry);

        let mut evicted = Vec::new();
        while self.surfaces.len() > self.limits.max_cached_terminals {
            let Some((id, oldest)) = self.surfaces.pop_lru() else {
                break;
            };
            let snapshot = oldest.release();
            self.store_snapshot(id, snapshot);
            self.evictions += 1;
            tracing::debug!(terminal_id = %id, "Evicted cached terminal");
            evicted.push(id);
        }
        evicted
    }

    /// Look up a live surface without changing eviction order
    pub fn get_terminal_dom(&self, terminal_id: TerminalId) -> Option<&CachedTerminal> {
        self.surfaces.peek(&terminal_id)
    }

    pub fn get_terminal_dom_mut(&mut self, terminal_id: TerminalId) -> Option<&mut CachedTerminal> {
        self.surfaces.peek_mut(&terminal_id)
    }

    pub fn has_terminal_dom(&self, terminal_id: TerminalId) -> bool {
        self.surfaces.contains(&terminal_id)
    }

    /// Dispose a live surface, optionally keeping a snapshot of it
    pub fn dispose_terminal_dom(&mut self, terminal_id: TerminalId, snapshot: bool) -> bool {
        let Some(entry) = self.surfaces.pop(&terminal_id) else {
            return false;
        };
        if snapshot {
            let data = entry.release();
            self.store_snapshot(terminal_id, data);
        } else {
            entry.discard();
        }
        true
    }

    /// Store a snapshot; returns false when it exceeded the per-entry cap
    pub fn set_serialized_buffer(&mut self, terminal_id: TerminalId, data: String) -> bool {
        self.store_snapshot(terminal_id, data)
    }

    /// Get and delete a snapshot
    pub fn take_serialized_buffer(&mut self, terminal_id: TerminalId) -> Option<String> {
        self.buffers.take(terminal_id)
    }

    pub fn peek_serialized_buffer(&self, terminal_id: TerminalId) -> Option<&str> {
        self.buffers.peek(terminal_id)
    }

    /// Best available scrollback without consuming anything
    pub fn snapshot(&self, terminal_id: TerminalId) -> Option<String> {
        self.get_terminal_dom(terminal_id)
            .map(CachedTerminal::serialize)
            .or_else(|| self.peek_serialized_buffer(terminal_id).map(str::to_string))
    }

    /// Drop everything held for a terminal
    pub fn remove_terminal(&mut self, terminal_id: TerminalId) {
        self.dispose_terminal_dom(terminal_id, false);
        self.buffers.remove(terminal_id);
    }

    pub fn clear(&mut self) {
        while let Some((_, entry)) = self.surfaces.pop_lru() {
            entry.discard();
        }
        self.buffers.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_terminals: self.surfaces.len(),
            serialized_terminals: self.buffers.len(),
            serialized_bytes: self.buffers.total_bytes(),
            evictions: self.evictions,
            rejected_snapshots: self.rejected,
        }
    }

    fn store_snapshot(&mut self, terminal_id: TerminalId, data: String) -> bool {
        let size = data.len();
        match self.buffers.set(terminal_id, data) {
            StoreOutcome::Stored { evicted } => {
                for id in evicted {
                    tracing::debug!(terminal_id = %id, "Evicted serialized buffer");
                }
                true
            }
            StoreOutcome::Rejected => {
                self.rejected += 1;
                tracing::warn!(
                    terminal_id = %terminal_id,
                    size,
                    "Snapshot exceeds per-terminal limit, not cached"
                );
                false
            }
        }
    }
}

impl Default for TerminalResourceCache {
    fn default() -> Self {
        Self::new(CacheLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    /// Surface that records the order of serialize and dispose calls
    struct RecordingSurface {
        content: String,
        log: Arc<Mutex<Vec<&'static str>>>,
        disposed: Arc<AtomicUsize>,
        is_disposed: bool,
    }

    impl RecordingSurface {
        fn boxed(
            content: &str,
            log: &Arc<Mutex<Vec<&'static str>>>,
            disposed: &Arc<AtomicUsize>,
        ) -> Box<dyn TerminalSurface> {
            Box::new(Self {
                content: content.to_string(),
                log: Arc::clone(log),
                disposed: Arc::clone(disposed),
                is_disposed: false,
            })
        }
    }

    impl TerminalSurface for RecordingSurface {
        fn write(&mut self, data: &[u8]) {
            self.content.push_str(&String::from_utf8_lossy(data));
        }
        fn resize(&mut self, _cols: u16, _rows: u16) {}
        fn serialize(&self) -> String {
            self.log.lock().unwrap().push("serialize");
            self.content.clone()
        }
        fn search(&self, _needle: &str) -> Vec<u16> {
            Vec::new()
        }
        fn dispose(&mut self) {
            self.log.lock().unwrap().push("dispose");
            self.disposed.fetch_add(1, Ordering::SeqCst);
            self.is_disposed = true;
        }
        fn is_disposed(&self) -> bool {
            self.is_disposed
        }
    }

    fn vt(terminal_id: TerminalId, text: &str) -> CachedTerminal {
        let mut surface = Vt100Surface::new(80, 24);
        surface.write(text.as_bytes());
        CachedTerminal::new(terminal_id, Box::new(surface))
    }

    #[test]
    fn test_one_past_capacity_evicts_exactly_one() {
        let mut cache = TerminalResourceCache::default();
        let ids: Vec<_> = (0..=MAX_CACHED_TERMINALS).map(|_| Uuid::new_v4()).collect();

        let mut evicted = Vec::new();
        for (n, id) in ids.iter().enumerate() {
            evicted.extend(cache.cache_terminal_dom(vt(*id, &format!("terminal {}", n))));
        }

        assert_eq!(evicted, vec![ids[0]]);
        assert_eq!(cache.stats().cached_terminals, MAX_CACHED_TERMINALS);
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache.get_terminal_dom(ids[0]).is_none());

        let restored = cache.take_serialized_buffer(ids[0]).unwrap();
        assert!(restored.contains("terminal 0"));
        assert!(cache.take_serialized_buffer(ids[0]).is_none());
    }

    #[test]
    fn test_replace_snapshots_outgoing_before_install() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let disposed = Arc::new(AtomicUsize::new(0));
        let mut cache = TerminalResourceCache::default();
        let id = Uuid::new_v4();

        cache.cache_terminal_dom(CachedTerminal::new(
            id,
            RecordingSurface::boxed("old screen", &log, &disposed),
        ));
        let evicted = cache.cache_terminal_dom(CachedTerminal::new(
            id,
            RecordingSurface::boxed("new screen", &log, &disposed),
        ));

        assert!(evicted.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["serialize", "dispose"]);
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(cache.peek_serialized_buffer(id), Some("old screen"));
        assert_eq!(cache.get_terminal_dom(id).unwrap().serialize(), "new screen");
    }

    #[test]
    fn test_get_does_not_reorder() {
        let limits = CacheLimits {
            max_cached_terminals: 2,
            ..Default::default()
        };
        let mut cache = TerminalResourceCache::new(limits);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        cache.cache_terminal_dom(vt(a, "a"));
        cache.cache_terminal_dom(vt(b, "b"));

        // Reading `a` must not protect it from eviction
        assert!(cache.get_terminal_dom(a).is_some());
        assert_eq!(cache.cache_terminal_dom(vt(c, "c")), vec![a]);
    }

    #[test]
    fn test_dispose_with_and_without_snapshot() {
        let mut cache = TerminalResourceCache::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.cache_terminal_dom(vt(a, "keep me"));
        cache.cache_terminal_dom(vt(b, "drop me"));

        assert!(cache.dispose_terminal_dom(a, true));
        assert!(cache.dispose_terminal_dom(b, false));
        assert!(!cache.dispose_terminal_dom(b, false));

        assert!(cache.peek_serialized_buffer(a).unwrap().contains("keep me"));
        assert!(cache.peek_serialized_buffer(b).is_none());
    }

    #[test]
    fn test_oversized_snapshot_rejected() {
        let limits = CacheLimits {
            max_serialize_bytes: 8,
            ..Default::default()
        };
        let mut cache = TerminalResourceCache::new(limits);
        let id = Uuid::new_v4();

        assert!(!cache.set_serialized_buffer(id, "123456789".into()));
        assert!(cache.peek_serialized_buffer(id).is_none());
        assert_eq!(cache.stats().rejected_snapshots, 1);
        assert!(cache.set_serialized_buffer(id, "12345678".into()));
    }

    #[test]
    fn test_snapshot_prefers_live_surface() {
        let mut cache = TerminalResourceCache::default();
        let id = Uuid::new_v4();
        cache.set_serialized_buffer(id, "stale".into());
        assert_eq!(cache.snapshot(id).as_deref(), Some("stale"));

        cache.cache_terminal_dom(vt(id, "live"));
        assert!(cache.snapshot(id).unwrap().contains("live"));
        // Peeking does not consume
        assert!(cache.peek_serialized_buffer(id).is_some());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = TerminalResourceCache::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        cache.cache_terminal_dom(vt(a, "a"));
        cache.set_serialized_buffer(a, "a".into());
        cache.cache_terminal_dom(vt(b, "b"));

        cache.remove_terminal(a);
        assert!(!cache.has_terminal_dom(a));
        assert!(cache.peek_serialized_buffer(a).is_none());

        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.cached_terminals, 0);
        assert_eq!(stats.serialized_terminals, 0);
        assert_eq!(stats.serialized_bytes, 0);
    }

    #[test]
    fn test_clear_and_plain_dispose_skip_serialization() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let disposed = Arc::new(AtomicUsize::new(0));
        let mut cache = TerminalResourceCache::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        for id in [a, b, c] {
            cache.cache_terminal_dom(CachedTerminal::new(
                id,
                RecordingSurface::boxed("screen", &log, &disposed),
            ));
        }

        assert!(cache.dispose_terminal_dom(a, false));
        cache.clear();

        assert_eq!(disposed.load(Ordering::SeqCst), 3);
        assert_eq!(*log.lock().unwrap(), vec!["dispose", "dispose", "dispose"]);
    }
}
