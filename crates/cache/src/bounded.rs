//! Byte-budget associative cache with LRU eviction
//!
//! Provides the capacity-limited store underlying every resource cache in the
//! system. Entries carry an explicit byte size; when an insertion pushes the
//! cache over its capacity, the least recently touched entries are evicted
//! until usage falls back to the low-water mark.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::CacheError;

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries currently in the cache
    pub entry_count: usize,

    /// Total bytes used by resident entries
    pub used_bytes: usize,

    /// Capacity in bytes
    pub capacity_bytes: usize,

    /// Low-water mark in bytes (eviction target after a trim)
    pub low_water_bytes: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of entries evicted due to memory pressure
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate capacity utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.capacity_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.capacity_bytes as f64
        }
    }
}

/// One cached entry: the resource, its byte size, and a pin flag
struct Entry<V> {
    value: V,
    size_bytes: usize,
    pinned: bool,
}

/// Internal cache state
struct CacheState<K, V> {
    /// Map from key to entry
    entries: HashMap<K, Entry<V>>,

    /// LRU queue (most recently touched at back, least at front)
    lru_queue: VecDeque<K>,

    /// Current byte usage
    used_bytes: usize,

    /// Capacity in bytes
    capacity_bytes: usize,

    /// Eviction target after a trim
    low_water_bytes: usize,

    /// Statistics
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V> CacheState<K, V> {
    fn new(capacity_bytes: usize, low_water_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            used_bytes: 0,
            capacity_bytes,
            low_water_bytes,
            stats: CacheStats {
                capacity_bytes,
                low_water_bytes,
                ..Default::default()
            },
        }
    }

    /// Move a key to the back of the LRU queue (mark as most recently touched)
    fn touch(&mut self, key: &K) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.clone());
    }

    fn remove_entry(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.used_bytes = self.used_bytes.saturating_sub(entry.size_bytes);
        self.lru_queue.retain(|k| k != key);
        self.sync_stats();
        Some(entry)
    }

    /// Evict oldest-touched entries until usage is at or below the low-water
    /// mark, skipping pinned entries and the protected key (the entry whose
    /// insertion triggered the trim). Skipped entries keep their position in
    /// the LRU order. Evicted values are appended to `evicted`.
    fn trim_to_low_water(&mut self, protect: Option<&K>, evicted: &mut Vec<(K, V)>) {
        let mut pinned_skipped: Vec<K> = Vec::new();

        while self.used_bytes > self.low_water_bytes {
            let Some(key) = self.lru_queue.pop_front() else {
                break;
            };

            let is_pinned = self.entries.get(&key).map(|e| e.pinned).unwrap_or(false);
            if is_pinned || protect == Some(&key) {
                pinned_skipped.push(key);
                continue;
            }

            if let Some(entry) = self.entries.remove(&key) {
                self.used_bytes = self.used_bytes.saturating_sub(entry.size_bytes);
                self.stats.evictions += 1;
                evicted.push((key, entry.value));
            }
        }

        // Restore skipped pinned keys to the front, oldest first
        for key in pinned_skipped.into_iter().rev() {
            self.lru_queue.push_front(key);
        }

        if self.used_bytes > self.capacity_bytes {
            // Every remaining entry is pinned for the current frame. Tolerate
            // the overflow rather than evicting a resource mid-draw.
            log::warn!(
                "cache over capacity with no evictable entries: {} used, {} capacity",
                self.used_bytes,
                self.capacity_bytes
            );
        }

        self.sync_stats();
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.used_bytes = self.used_bytes;
        self.stats.capacity_bytes = self.capacity_bytes;
        self.stats.low_water_bytes = self.low_water_bytes;
    }
}

/// Byte-budget associative cache with LRU eviction
///
/// Thread-safe store keyed by an opaque identity. Each entry carries an
/// explicit byte size; `put` evicts least-recently-touched entries whenever
/// usage exceeds capacity, trimming down to the low-water mark. Entries can
/// be pinned for the duration of a frame, which exempts them from eviction.
///
/// Eviction never drops a resource silently: `put`, `update_size`, `remove`,
/// `clear`, and `set_capacity` hand evicted values back to the caller so
/// resources with a release obligation (GPU handles) can be disposed of
/// properly.
///
/// # Example
///
/// ```
/// use globestream_cache::BoundedCache;
///
/// let cache: BoundedCache<u64, Vec<u8>> = BoundedCache::new(100, 80).unwrap();
///
/// let _ = cache.put(1, vec![0u8; 30], 30);
/// assert_eq!(cache.used_bytes(), 30);
///
/// if let Some(bytes) = cache.get(&1) {
///     assert_eq!(bytes.len(), 30);
/// }
/// ```
pub struct BoundedCache<K, V> {
    state: Arc<Mutex<CacheState<K, V>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    /// Create a new cache with the given capacity and low-water mark, both in
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity_bytes` is zero or `low_water_bytes`
    /// exceeds `capacity_bytes`.
    pub fn new(capacity_bytes: usize, low_water_bytes: usize) -> Result<Self, CacheError> {
        if capacity_bytes == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        if low_water_bytes > capacity_bytes {
            return Err(CacheError::LowWaterAboveCapacity {
                low_water: low_water_bytes,
                capacity: capacity_bytes,
            });
        }

        Ok(Self {
            state: Arc::new(Mutex::new(CacheState::new(capacity_bytes, low_water_bytes))),
        })
    }

    /// Insert or replace an entry and mark it most recently touched.
    ///
    /// If the insertion pushes usage over capacity, least-recently-touched
    /// entries are evicted down to the low-water mark. The returned vector
    /// holds every value displaced by this call: the previous value under
    /// `key` if one existed, followed by any evicted entries. A single entry
    /// larger than the whole capacity is accepted; it transiently exceeds the
    /// budget and becomes the first eviction candidate later.
    #[must_use = "displaced values may hold resources that need releasing"]
    pub fn put(&self, key: K, value: V, size_bytes: usize) -> Vec<(K, V)> {
        let mut state = self.state.lock().unwrap();
        let mut displaced = Vec::new();

        if let Some(old) = state.remove_entry(&key) {
            displaced.push((key.clone(), old.value));
        }

        state.used_bytes += size_bytes;
        state.entries.insert(
            key.clone(),
            Entry {
                value,
                size_bytes,
                pinned: false,
            },
        );
        state.touch(&key);

        if state.used_bytes > state.capacity_bytes {
            state.trim_to_low_water(Some(&key), &mut displaced);
        }

        state.sync_stats();
        displaced
    }

    /// Retrieve an entry's value, marking it most recently touched.
    ///
    /// Returns a clone of the stored value, or `None` on a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock().unwrap();

        if let Some(value) = state.entries.get(key).map(|e| e.value.clone()) {
            state.touch(key);
            state.stats.hits += 1;
            Some(value)
        } else {
            state.stats.misses += 1;
            None
        }
    }

    /// Check for an entry without touching it (no LRU update)
    pub fn contains(&self, key: &K) -> bool {
        let state = self.state.lock().unwrap();
        state.entries.contains_key(key)
    }

    /// Remove one entry, returning its value if it was present
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock().unwrap();
        state.remove_entry(key).map(|e| e.value)
    }

    /// Remove all entries, returning them for release
    #[must_use = "removed values may hold resources that need releasing"]
    pub fn clear(&self) -> Vec<(K, V)> {
        let mut state = self.state.lock().unwrap();

        let removed: Vec<(K, V)> = state
            .lru_queue
            .drain(..)
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|k| state.entries.remove(&k).map(|e| (k, e.value)))
            .collect();

        state.entries.clear();
        state.used_bytes = 0;
        state.sync_stats();
        removed
    }

    /// Pin an entry for the current frame, exempting it from eviction.
    ///
    /// Pins are cleared in bulk by [`unpin_all`](Self::unpin_all) at the
    /// start of the next frame.
    pub fn pin(&self, key: &K) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.pinned = true;
        }
    }

    /// Clear every pin. Called once per frame before tile resolution.
    pub fn unpin_all(&self) {
        let mut state = self.state.lock().unwrap();
        for entry in state.entries.values_mut() {
            entry.pinned = false;
        }
    }

    /// Re-record the byte size of an existing entry, trimming immediately if
    /// the cache is now over capacity.
    ///
    /// Used for entries whose footprint changes after insertion, such as a
    /// tile that acquires or sheds decoded pixel data. The resized entry
    /// itself is exempt from the trim, like a fresh insertion; growing past
    /// the whole budget transiently exceeds it. Unknown keys are a no-op.
    #[must_use = "displaced values may hold resources that need releasing"]
    pub fn update_size(&self, key: &K, size_bytes: usize) -> Vec<(K, V)> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        let Some(entry) = state.entries.get_mut(key) else {
            return Vec::new();
        };
        let old = std::mem::replace(&mut entry.size_bytes, size_bytes);
        state.used_bytes = state.used_bytes.saturating_sub(old) + size_bytes;

        let mut evicted = Vec::new();
        if state.used_bytes > state.capacity_bytes {
            state.trim_to_low_water(Some(key), &mut evicted);
        }
        state.sync_stats();
        evicted
    }

    /// Change the capacity and low-water mark, trimming immediately if the
    /// cache is now over the new capacity.
    ///
    /// # Errors
    ///
    /// Same validation as [`new`](Self::new).
    #[must_use = "displaced values may hold resources that need releasing"]
    pub fn set_capacity(
        &self,
        capacity_bytes: usize,
        low_water_bytes: usize,
    ) -> Result<Vec<(K, V)>, CacheError> {
        if capacity_bytes == 0 {
            return Err(CacheError::ZeroCapacity);
        }
        if low_water_bytes > capacity_bytes {
            return Err(CacheError::LowWaterAboveCapacity {
                low_water: low_water_bytes,
                capacity: capacity_bytes,
            });
        }

        let mut state = self.state.lock().unwrap();
        state.capacity_bytes = capacity_bytes;
        state.low_water_bytes = low_water_bytes;

        let mut evicted = Vec::new();
        if state.used_bytes > state.capacity_bytes {
            state.trim_to_low_water(None, &mut evicted);
        }
        state.sync_stats();
        Ok(evicted)
    }

    /// Current byte usage
    pub fn used_bytes(&self) -> usize {
        self.state.lock().unwrap().used_bytes
    }

    /// Capacity in bytes
    pub fn capacity_bytes(&self) -> usize {
        self.state.lock().unwrap().capacity_bytes
    }

    /// Low-water mark in bytes
    pub fn low_water_bytes(&self) -> usize {
        self.state.lock().unwrap().low_water_bytes
    }

    /// Number of entries currently in the cache
    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// Current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.state.lock().unwrap().stats
    }
}
