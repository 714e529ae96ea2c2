//! Property-Based Tests for the Cache Module
//!
//! Uses proptest to verify the cache invariants over arbitrary operation
//! sequences: the size bound always holds, rejected entries change nothing,
//! eviction follows recency order and stats windows reset cleanly.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use crate::cache::LruCache;
use crate::error::Error;
use crate::frame::Frame;

const TEST_MAX_SIZE: usize = 2_000_000;
const TEST_HISTORY: usize = 1000;

// == Strategies ==
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-e]{1}".prop_map(|s| s)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Put { key: String, size: usize },
    Get { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), 0usize..3_000_000usize)
            .prop_map(|(key, size)| CacheOp::Put { key, size }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
    ]
}

fn new_cache() -> LruCache {
    LruCache::new(TEST_MAX_SIZE, Duration::ZERO, TEST_HISTORY)
}

fn put(cache: &mut LruCache, key: &str, size: usize) -> Result<(), Error> {
    cache.put(key.to_string(), Arc::new(Frame::empty()), size)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // The accounted size never exceeds the bound, and a rejected put leaves
    // the cache exactly as it was.
    #[test]
    fn prop_size_bound_holds(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let mut cache = new_cache();

        for op in ops {
            match op {
                CacheOp::Put { key, size } => {
                    let before_bytes = cache.byte_size();
                    let before_len = cache.len();
                    match put(&mut cache, &key, size) {
                        Ok(()) => {
                            prop_assert!(cache.byte_size() <= TEST_MAX_SIZE, "over budget after put");
                        }
                        Err(Error::TooLarge(_)) => {
                            prop_assert_eq!(cache.byte_size(), before_bytes, "rejected put changed size");
                            prop_assert_eq!(cache.len(), before_len, "rejected put changed contents");
                        }
                        Err(other) => return Err(TestCaseError::fail(format!("unexpected error: {other}"))),
                    }
                }
                CacheOp::Get { key } => {
                    let _ = cache.get(&key);
                }
            }
        }
    }

    // A freshly stored entry that fits is retrievable as long as nothing
    // forced it out.
    #[test]
    fn prop_put_then_get_hits(key in key_strategy(), size in 0usize..500_000usize) {
        let mut cache = new_cache();
        put(&mut cache, &key, size).unwrap();
        prop_assert!(cache.get(&key).is_some());
    }

    // Eviction removes keys in least-recently-touched order.
    #[test]
    fn prop_eviction_follows_recency(
        touch_order in proptest::sample::subsequence(vec!["a", "b", "c", "d"], 0..=4usize),
    ) {
        // Four entries fill the cache almost exactly; each additional put
        // evicts exactly one.
        let entry_size = 480_000;
        let mut cache = new_cache();
        for key in ["a", "b", "c", "d"] {
            put(&mut cache, key, entry_size).unwrap();
        }

        // Touch a subsequence; the untouched keys stay least recent, in
        // their original insertion order.
        for key in &touch_order {
            prop_assert!(cache.get(key).is_some());
        }

        let mut expected: Vec<&str> = ["a", "b", "c", "d"]
            .into_iter()
            .filter(|k| !touch_order.contains(k))
            .collect();
        expected.extend(touch_order.iter().copied());

        // Evict one at a time by inserting fresh keys and check that the
        // expected victim disappeared.
        for (i, victim) in expected.iter().enumerate() {
            put(&mut cache, &format!("new{i}"), entry_size).unwrap();
            prop_assert!(cache.get(victim).is_none(), "expected {victim} evicted");
        }
    }

    // Two consecutive stats calls with nothing in between: the second window
    // is empty.
    #[test]
    fn prop_stats_window_resets(ops in prop::collection::vec(cache_op_strategy(), 0..30)) {
        let mut cache = new_cache();
        for op in ops {
            match op {
                CacheOp::Put { key, size } => { let _ = put(&mut cache, &key, size); }
                CacheOp::Get { key } => { let _ = cache.get(&key); }
            }
        }

        let _ = cache.stats();
        let second = cache.stats();
        prop_assert_eq!(second.size_evict_count, 0);
        prop_assert_eq!(second.age_evict_count, 0);
        prop_assert_eq!(second.replace_count, 0);
        prop_assert!(second.times_to_eviction.is_empty());
    }
}
