//! Statistics Module
//!
//! Global request statistics: counters plus bounded sample buffers, windowed
//! between snapshots. Each request carries a probe slot in its extensions;
//! handlers arm it with a store or query probe and the statistics middleware
//! registers the outcome when the request unwinds.

mod mem;

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::LruCache;
pub use mem::MemStats;

// == Probe Slot ==
/// Per-request probe carrier, cloned into request extensions.
#[derive(Clone)]
pub struct ProbeSlot {
    created: Instant,
    state: Arc<Mutex<Probe>>,
}

#[derive(Debug, Clone)]
enum Probe {
    Idle,
    Query {
        start: Instant,
        stop: Option<Instant>,
        hit: bool,
    },
    Store {
        start: Instant,
        stop: Option<Instant>,
        rows: usize,
        success: bool,
    },
}

impl ProbeSlot {
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            state: Arc::new(Mutex::new(Probe::Idle)),
        }
    }

    /// Arms the slot as a query probe, replacing whatever was there.
    pub fn start_query(&self) {
        *self.state.lock() = Probe::Query {
            start: Instant::now(),
            stop: None,
            hit: false,
        };
    }

    pub fn query_success(&self) {
        if let Probe::Query { stop, hit, .. } = &mut *self.state.lock() {
            *stop = Some(Instant::now());
            *hit = true;
        }
    }

    pub fn query_missing(&self) {
        if let Probe::Query { hit, .. } = &mut *self.state.lock() {
            *hit = false;
        }
    }

    /// Arms the slot as a store probe, replacing whatever was there.
    pub fn start_store(&self) {
        *self.state.lock() = Probe::Store {
            start: Instant::now(),
            stop: None,
            rows: 0,
            success: false,
        };
    }

    pub fn store_success(&self, row_count: usize) {
        if let Probe::Store {
            stop,
            rows,
            success,
            ..
        } = &mut *self.state.lock()
        {
            *stop = Some(Instant::now());
            *rows = row_count;
            *success = true;
        }
    }
}

impl Default for ProbeSlot {
    fn default() -> Self {
        Self::new()
    }
}

// == Statistics ==
/// Global statistics collector. One mutex guards the windowed data; the
/// cache keeps its own counters behind its own lock.
pub struct Statistics {
    cache: Arc<Mutex<LruCache>>,
    buffer_size: usize,
    window: Mutex<Window>,
}

struct Window {
    hit_count: u64,
    miss_count: u64,
    store_count: u64,
    query_durations: Vec<f64>,
    total_query_durations: Vec<f64>,
    store_durations: Vec<f64>,
    total_store_durations: Vec<f64>,
    store_row_counts: Vec<usize>,
    since: Instant,
}

impl Window {
    fn new(buffer_size: usize) -> Self {
        let cap = buffer_size.min(4096);
        Self {
            hit_count: 0,
            miss_count: 0,
            store_count: 0,
            query_durations: Vec::with_capacity(cap),
            total_query_durations: Vec::with_capacity(cap),
            store_durations: Vec::with_capacity(cap),
            total_store_durations: Vec::with_capacity(cap),
            store_row_counts: Vec::with_capacity(cap),
            since: Instant::now(),
        }
    }
}

impl Statistics {
    pub fn new(cache: Arc<Mutex<LruCache>>, buffer_size: usize) -> Self {
        Self {
            cache,
            buffer_size,
            window: Mutex::new(Window::new(buffer_size)),
        }
    }

    /// Records the probe's outcome. Called by the statistics middleware when
    /// the request unwinds; an idle slot registers nothing.
    pub fn register(&self, slot: &ProbeSlot) {
        let probe = slot.state.lock().clone();
        let total = slot.created.elapsed().as_secs_f64();
        let mut window = self.window.lock();

        match probe {
            Probe::Idle => {}
            Probe::Query { start, stop, hit } => {
                if hit {
                    window.hit_count += 1;
                    if let Some(stop) = stop {
                        // Samples past the buffer capacity are dropped
                        if window.query_durations.len() < self.buffer_size {
                            let query = (stop - start).as_secs_f64();
                            window.query_durations.push(query);
                            window.total_query_durations.push(total);
                        }
                    }
                } else {
                    window.miss_count += 1;
                }
            }
            Probe::Store {
                start,
                stop,
                rows,
                success,
            } => {
                if success {
                    window.store_count += 1;
                    if let Some(stop) = stop {
                        if window.store_durations.len() < self.buffer_size {
                            let store = (stop - start).as_secs_f64();
                            window.store_durations.push(store);
                            window.total_store_durations.push(total);
                            window.store_row_counts.push(rows);
                        }
                    }
                }
            }
        }
    }

    /// Takes a consistent snapshot and resets the window. The cache lock is
    /// taken while the window mutex is held; no other path takes both.
    pub fn stats(&self) -> StatisticsData {
        let mem_stats = mem::read_mem_stats();

        let mut window = self.window.lock();
        let cache_stats = self.cache.lock().stats();
        let now = Instant::now();
        let window = std::mem::replace(&mut *window, Window::new(self.buffer_size));

        StatisticsData {
            dataset_count: cache_stats.item_count,
            cache_size: cache_stats.byte_size,
            hit_count: window.hit_count,
            miss_count: window.miss_count,
            size_evict_count: cache_stats.size_evict_count,
            age_evict_count: cache_stats.age_evict_count,
            replace_count: cache_stats.replace_count,
            store_count: window.store_count,
            statistics_duration: (now - window.since).as_secs_f64(),
            statistics_buffer_size: self.buffer_size,
            store_durations: window.store_durations,
            store_row_counts: window.store_row_counts,
            query_durations: window.query_durations,
            durations_until_eviction: cache_stats
                .times_to_eviction
                .iter()
                .map(|d| d.as_secs_f64())
                .collect(),
            total_query_durations: window.total_query_durations,
            total_store_durations: window.total_store_durations,
            mem_stats,
        }
    }
}

// == Wire Format ==
/// The statistics JSON document. Field names match the historical qcache
/// wire format, including `go_mem_stats`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatisticsData {
    pub dataset_count: usize,
    pub cache_size: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub size_evict_count: u64,
    pub age_evict_count: u64,
    pub replace_count: u64,
    pub store_count: u64,
    pub statistics_duration: f64,
    pub statistics_buffer_size: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub store_durations: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub store_row_counts: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_durations: Vec<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub durations_until_eviction: Vec<f64>,
    #[serde(default, rename = "query_request_durations")]
    pub total_query_durations: Vec<f64>,
    #[serde(default, rename = "store_request_durations")]
    pub total_store_durations: Vec<f64>,
    #[serde(default, rename = "go_mem_stats")]
    pub mem_stats: MemStats,
}
