//! Cache Statistics Module
//!
//! Windowed counters captured by `LruCache::stats`. The eviction counters and
//! duration samples accumulate between snapshots; taking a snapshot resets
//! them.

use std::time::Duration;

// == Cache Stats ==
/// A snapshot of the cache counters since the previous snapshot.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Lifetimes of entries removed during the window.
    pub times_to_eviction: Vec<Duration>,
    /// Current accounted size in bytes, including overheads.
    pub byte_size: usize,
    /// Current number of stored datasets.
    pub item_count: usize,
    pub age_evict_count: u64,
    pub size_evict_count: u64,
    pub replace_count: u64,
    /// Length of the window this snapshot covers.
    pub stat_duration: Duration,
}
