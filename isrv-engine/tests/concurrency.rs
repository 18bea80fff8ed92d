//! # Cache Concurrency Tests
//!
//! Purpose: Hammer the public cache API from several threads and check that
//! the capacity bound and the entry count stay consistent.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use isrv_common::CacheConfig;
use isrv_engine::{CacheKey, PutOutcome, ResponseCache};

fn cache(capacity: usize, ttl_ms: u64) -> Arc<ResponseCache> {
    Arc::new(ResponseCache::new(&CacheConfig {
        capacity,
        ttl_ms,
        sweep_interval_ms: 1,
    }))
}

#[test]
fn capacity_holds_under_contention() {
    let cache = cache(64, 60_000);
    let writers: Vec<_> = (0..8)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let mut inserted = 0;
                for i in 0..100 {
                    let key = CacheKey::from_fields(["q".to_string(), t.to_string(), i.to_string()]);
                    if cache.put(key, "v") == PutOutcome::Inserted {
                        inserted += 1;
                    }
                }
                inserted
            })
        })
        .collect();

    let inserted: usize = writers.into_iter().map(|w| w.join().unwrap()).sum();
    assert_eq!(inserted, 64);
    assert_eq!(cache.len(), 64);
    assert_eq!(cache.stats().rejected, 8 * 100 - 64);
}

#[test]
fn sweeper_and_writers_keep_count_consistent() {
    let cache = cache(10_000, 1);
    cache.start_sweeper().unwrap();

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..500 {
                    let key = CacheKey::from_fields(["r".to_string(), format!("{t}-{i}")]);
                    cache.put(key.clone(), "v");
                    let _ = cache.get(&key);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    thread::sleep(Duration::from_millis(50));
    cache.clean();
    assert_eq!(cache.len(), 0);
    assert!(cache.len() <= cache.capacity());

    cache.shutdown();
    assert!(!cache.is_sweeping());
}
