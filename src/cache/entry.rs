//! Cache Entry Module
//!
//! One stored dataset: the frame, its accounted size and its creation time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::frame::Frame;

/// Estimated bookkeeping cost of one hash-map slot.
const MAP_ENTRY_OVERHEAD: usize = 64;

// == Cache Entry ==
/// A single cache entry. `size` includes the per-entry overhead so that the
/// cache's byte accounting covers its own bookkeeping, not just frame data.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub frame: Arc<Frame>,
    pub size: usize,
    pub created_at: Instant,
}

impl CacheEntry {
    pub fn new(key: String, frame: Arc<Frame>, byte_size: usize) -> Self {
        let size = byte_size + entry_overhead(&key);
        Self {
            key,
            frame,
            size,
            created_at: Instant::now(),
        }
    }

    /// True when the entry is older than `max_age`; a zero `max_age` means
    /// entries never expire.
    pub fn has_expired(&self, max_age: Duration) -> bool {
        !max_age.is_zero() && self.created_at.elapsed() > max_age
    }

    /// Elapsed lifetime, sampled when the entry is removed.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Fixed per-entry overhead added to the reported frame size.
pub fn entry_overhead(key: &str) -> usize {
    std::mem::size_of::<CacheEntry>() + key.len() + MAP_ENTRY_OVERHEAD
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn entry() -> CacheEntry {
        CacheEntry::new("k".to_string(), Arc::new(Frame::empty()), 100)
    }

    #[test]
    fn test_size_includes_overhead() {
        let e = entry();
        assert!(e.size > 100);
        assert_eq!(e.size, 100 + entry_overhead("k"));
    }

    #[test]
    fn test_zero_max_age_never_expires() {
        assert!(!entry().has_expired(Duration::ZERO));
    }

    #[test]
    fn test_expiry() {
        let e = entry();
        sleep(Duration::from_millis(2));
        assert!(e.has_expired(Duration::from_nanos(1)));
        assert!(!e.has_expired(Duration::from_secs(60)));
    }
}
