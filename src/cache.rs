/// Memory-budgeted LRU cache of decoded thumbnails
///
/// The cache owns every pixel buffer it holds. Callers get `Arc` clones that
/// are meant to live for one render pass; grid items re-fetch every frame, so
/// evicting an entry never leaves a consumer pointing at freed memory.
///
/// One `parking_lot::Mutex` guards the access-ordered map and the byte
/// accumulator together. Every operation, including `get` (it moves the
/// entry to the front), takes the lock exclusively, so no caller can observe
/// an entry half inserted or half evicted.

use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::CacheConfig;
use crate::data::{CacheKey, DecodedImage};

/// Cached image plus the cost it was admitted with
struct CacheEntry {
    image: Arc<DecodedImage>,
    cost: usize,
}

/// What `put` did with an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// New key stored; `evicted` older entries were dropped to make room
    Inserted { evicted: usize },
    /// Existing entry for the key superseded
    Replaced { evicted: usize },
    /// The image alone is larger than the whole cache; nothing changed
    Rejected { cost: usize },
}

impl PutOutcome {
    pub fn is_stored(&self) -> bool {
        !matches!(self, PutOutcome::Rejected { .. })
    }
}

/// Counters since the cache was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    pub rejections: u64,
}

struct CacheInner {
    entries: LruCache<CacheKey, CacheEntry>,
    size: usize,
    stats: CacheStats,
}

/// Thread-safe, byte-budgeted thumbnail cache
pub struct ThumbnailCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl ThumbnailCache {
    /// Create a cache holding at most `capacity_bytes` of pixel data
    pub fn new(capacity_bytes: usize) -> Self {
        debug!(capacity_bytes, "thumbnail cache created");
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                size: 0,
                stats: CacheStats::default(),
            }),
            capacity: capacity_bytes,
        }
    }

    /// Create a cache sized from the configured share of available memory
    pub fn from_config(config: &CacheConfig) -> Self {
        let capacity = usize::try_from(config.resolve_capacity()).unwrap_or(usize::MAX);
        Self::new(capacity)
    }

    /// Look up `key` and mark it most recently used
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DecodedImage>> {
        let mut inner = self.inner.lock();
        let found = inner.entries.get(key).map(|entry| Arc::clone(&entry.image));
        if found.is_some() {
            inner.stats.hits += 1;
            trace!(%key, "cache hit");
        } else {
            inner.stats.misses += 1;
            trace!(%key, "cache miss");
        }
        found
    }

    /// Look up `key` without touching its recency
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<DecodedImage>> {
        self.inner
            .lock()
            .entries
            .peek(key)
            .map(|entry| Arc::clone(&entry.image))
    }

    pub fn contains_key(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Insert or replace `key`.
    ///
    /// When the total cost exceeds capacity afterwards, least recently used
    /// entries are evicted until it fits again. The entry just inserted is
    /// the most recently used one, so it is never the one evicted. An image
    /// that would not fit even in an empty cache is rejected instead.
    pub fn put(&self, key: CacheKey, image: impl Into<Arc<DecodedImage>>) -> PutOutcome {
        let image = image.into();
        let cost = image.cost();

        let mut inner = self.inner.lock();
        if cost > self.capacity {
            inner.stats.rejections += 1;
            warn!(%key, cost, capacity = self.capacity, "image larger than cache, not stored");
            return PutOutcome::Rejected { cost };
        }

        let previous = inner.entries.put(key.clone(), CacheEntry { image, cost });
        let replaced = previous.is_some();
        if let Some(old) = previous {
            inner.size -= old.cost;
        }
        inner.size += cost;
        inner.stats.insertions += 1;

        let mut evicted = 0;
        while inner.size > self.capacity {
            let Some((old_key, old)) = inner.entries.pop_lru() else {
                break;
            };
            debug_assert!(old_key != key, "evicted the entry just inserted");
            inner.size -= old.cost;
            evicted += 1;
            debug!(key = %old_key, cost = old.cost, "evicted");
        }
        inner.stats.evictions += evicted as u64;

        self.check_capacity(&inner);

        if replaced {
            PutOutcome::Replaced { evicted }
        } else {
            PutOutcome::Inserted { evicted }
        }
    }

    /// Drop one entry, returning its image
    pub fn remove(&self, key: &CacheKey) -> Option<Arc<DecodedImage>> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.pop(key)?;
        inner.size -= removed.cost;
        Some(removed.image)
    }

    /// Evict least recently used entries until at most `target_bytes` remain.
    ///
    /// Partial response to memory pressure; returns how many were evicted.
    pub fn trim_to(&self, target_bytes: usize) -> usize {
        let mut inner = self.inner.lock();
        let mut evicted = 0;
        while inner.size > target_bytes {
            let Some((_, old)) = inner.entries.pop_lru() else {
                break;
            };
            inner.size -= old.cost;
            evicted += 1;
        }
        inner.stats.evictions += evicted as u64;
        if evicted > 0 {
            debug!(evicted, remaining = inner.size, "cache trimmed");
        }
        evicted
    }

    /// Drop everything (low-memory signal from the host)
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.size = 0;
        debug!(dropped, "cache cleared");
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total cost of all entries, in bytes
    pub fn size_bytes(&self) -> usize {
        self.inner.lock().size
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    fn check_capacity(&self, inner: &CacheInner) {
        debug_assert!(
            inner.size <= self.capacity,
            "cache capacity violated: {} > {}",
            inner.size,
            self.capacity
        );
    }
}
