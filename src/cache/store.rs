//! Cache Store Module
//!
//! The byte-bounded LRU cache with age expiry. A hash map from key to slab
//! index plus the recency list give O(1) hits; eviction walks the list tail.
//! All mutation happens behind one mutex held by the owner of this value.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::cache::entry::entry_overhead;
use crate::cache::{CacheEntry, CacheStats, RecencyList};
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Sizes below this are bumped to avoid degenerate caches that cannot hold a
/// single realistic frame.
const MIN_MAX_SIZE: usize = 1_000_000;

// == Cache Store ==
/// Byte-bounded keyed store of frames with LRU eviction and age expiry.
#[derive(Debug)]
pub struct LruCache {
    map: HashMap<String, usize>,
    list: RecencyList,
    max_size: usize,
    base_size: usize,
    current_size: usize,
    max_age: Duration,
    times_to_eviction: Vec<Duration>,
    history_capacity: usize,
    age_evict_count: u64,
    size_evict_count: u64,
    replace_count: u64,
    last_stats: Instant,
}

impl LruCache {
    /// Creates a cache bounded to `max_size` bytes. Entries older than
    /// `max_age` expire on access; zero disables expiry. `history_capacity`
    /// bounds the eviction-duration sample buffer.
    pub fn new(max_size: usize, max_age: Duration, history_capacity: usize) -> Self {
        let max_size = if max_size < MIN_MAX_SIZE {
            warn!(
                requested = max_size,
                floor = MIN_MAX_SIZE,
                "cache size below minimum, bumping to the floor"
            );
            MIN_MAX_SIZE
        } else {
            max_size
        };

        let base_size = std::mem::size_of::<LruCache>();
        Self {
            map: HashMap::new(),
            list: RecencyList::new(),
            max_size,
            base_size,
            current_size: base_size,
            max_age,
            times_to_eviction: Vec::with_capacity(history_capacity.min(1024)),
            history_capacity,
            age_evict_count: 0,
            size_evict_count: 0,
            replace_count: 0,
            last_stats: Instant::now(),
        }
    }

    // == Put ==
    /// Stores a frame under `key`. An existing entry under the same key is
    /// replaced. Least-recently-used entries are evicted until the new entry
    /// fits; an entry that cannot fit even in an empty cache is rejected
    /// without touching any state.
    pub fn put(&mut self, key: String, frame: Arc<Frame>, byte_size: usize) -> Result<()> {
        let size = byte_size + entry_overhead(&key);
        if self.base_size + size > self.max_size {
            return Err(Error::TooLarge(size));
        }

        if let Some(idx) = self.map.remove(&key) {
            self.remove_node(idx);
            self.replace_count += 1;
        }

        while self.current_size + size > self.max_size {
            let Some(tail) = self.list.back() else { break };
            self.evict(tail);
        }

        let entry = CacheEntry::new(key.clone(), frame, byte_size);
        self.current_size += entry.size;
        let idx = self.list.push_front(entry);
        self.map.insert(key, idx);
        Ok(())
    }

    // == Get ==
    /// Looks up `key`, refreshing its recency. An entry past its age is
    /// removed and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<Arc<Frame>> {
        let idx = *self.map.get(key)?;
        let entry = self.list.get(idx)?;

        if entry.has_expired(self.max_age) {
            self.map.remove(key);
            self.remove_node(idx);
            self.age_evict_count += 1;
            return None;
        }

        let frame = Arc::clone(&entry.frame);
        self.list.move_to_front(idx);
        Some(frame)
    }

    // == Replace ==
    /// Swaps the frame of an existing entry without touching recency order or
    /// the replacement counter. Used when the query path widens a stored
    /// frame with stand-in columns. No-op for an absent key.
    pub fn replace(&mut self, key: &str, frame: Arc<Frame>, byte_size: usize) {
        let Some(&idx) = self.map.get(key) else { return };
        let new_size = byte_size + entry_overhead(key);

        if let Some(entry) = self.list.get_mut(idx) {
            self.current_size = self.current_size - entry.size + new_size;
            entry.frame = frame;
            entry.size = new_size;
        }

        while self.current_size > self.max_size {
            let Some(tail) = self.list.back() else { break };
            self.evict(tail);
        }
    }

    // == Stats ==
    /// Captures the windowed counters and resets them.
    pub fn stats(&mut self) -> CacheStats {
        let now = Instant::now();
        let stats = CacheStats {
            times_to_eviction: std::mem::take(&mut self.times_to_eviction),
            byte_size: self.current_size,
            item_count: self.map.len(),
            age_evict_count: self.age_evict_count,
            size_evict_count: self.size_evict_count,
            replace_count: self.replace_count,
            stat_duration: now - self.last_stats,
        };
        self.age_evict_count = 0;
        self.size_evict_count = 0;
        self.replace_count = 0;
        self.last_stats = now;
        stats
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Current accounted size, including base and per-entry overheads.
    pub fn byte_size(&self) -> usize {
        self.current_size
    }

    /// Size-eviction of the list tail; also drops the map binding.
    fn evict(&mut self, idx: usize) {
        if let Some(entry) = self.list.get(idx) {
            self.map.remove(&entry.key);
        }
        self.remove_node(idx);
        self.size_evict_count += 1;
    }

    /// Unlinks a node, adjusting size accounting and sampling its lifetime.
    /// The map binding must already be gone.
    fn remove_node(&mut self, idx: usize) {
        if let Some(entry) = self.list.remove(idx) {
            self.current_size -= entry.size;
            if self.times_to_eviction.len() < self.history_capacity {
                self.times_to_eviction.push(entry.age());
            }
        }
    }
}
