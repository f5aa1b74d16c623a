//! Byte-budgeted LRU memory tier

use std::sync::Arc;

use lru::LruCache;
use serde_json::Value;
use tracing::trace;

struct CachedEntry {
    value: Arc<Value>,
    size: usize,
}

/// Estimated serialized size of a cached value, in bytes.
///
/// Values that cannot be sized count as zero so they are still cached
/// rather than silently refused.
pub(crate) fn estimate_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}

/// The in-memory cache tier: least-recently-used eviction, bounded by the
/// estimated serialized byte size of its values rather than entry count.
pub struct MemoryStore {
    entries: LruCache<String, CachedEntry>,
    total_bytes: usize,
    budget_bytes: usize,
}

impl MemoryStore {
    /// A store bounded to `budget_bytes`. A zero budget means unbounded.
    pub fn new(budget_bytes: usize) -> Self {
        let budget_bytes = if budget_bytes == 0 {
            usize::MAX
        } else {
            budget_bytes
        };
        Self {
            entries: LruCache::unbounded(),
            total_bytes: 0,
            budget_bytes,
        }
    }

    /// A store bounded to `budget_kb` kilobytes. A zero or overflowing
    /// budget falls open to unbounded.
    pub fn with_budget_kb(budget_kb: usize) -> Self {
        Self::new(budget_kb.checked_mul(1024).unwrap_or(usize::MAX))
    }

    /// Insert or replace a value, then evict least-recently-used entries
    /// until the budget holds again.
    pub fn put(&mut self, key: &str, value: Arc<Value>) {
        let size = estimate_size(&value);
        if let Some(old) = self.entries.put(key.to_string(), CachedEntry { value, size }) {
            self.total_bytes -= old.size;
        }
        self.total_bytes += size;

        while self.total_bytes > self.budget_bytes {
            match self.entries.pop_lru() {
                Some((evicted_key, evicted)) => {
                    trace!(key = %evicted_key, size = evicted.size, "evicting");
                    self.total_bytes -= evicted.size;
                }
                None => break,
            }
        }
    }

    /// Look a value up, marking it most recently used.
    pub fn get(&mut self, key: &str) -> Option<Arc<Value>> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Remove a value. Reports whether anything was there.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.total_bytes -= entry.size;
                true
            }
            None => false,
        }
    }

    /// Drop every entry; the budget stays in place.
    pub fn evict_all(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.entries.len())
            .field("total_bytes", &self.total_bytes)
            .field("budget_bytes", &self.budget_bytes)
            .finish()
    }
}
