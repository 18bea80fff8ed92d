//! # Response Cache
//!
//! Concurrent, capacity-bounded memo table for command results with idle-time
//! (TTL) eviction.
//!
//! ## Design Principles
//!
//! 1. **Sharded Locking**: Keys hash into a fixed set of `RwLock`ed shards so
//!    lookups on different keys rarely contend.
//! 2. **Read-Path Touch**: `get` only takes a read lock; last access is an
//!    atomic offset from the cache epoch.
//! 3. **Atomic Admission**: The capacity reservation and the insert happen
//!    under the same shard write lock, so the bound can never be overshot.
//! 4. **Passive Expiry**: Entries leave on idle time alone, never on pressure.
//!
//! ## Layout
//!
//! ```text
//! ResponseCache
//!   ├── Shared (Arc, also held by the sweeper thread)
//!   │     ├── shards[16]: RwLock<HashMap<CacheKey, CacheEntry>>
//!   │     ├── len: AtomicUsize          (live entries, <= capacity)
//!   │     └── counters                  (hits, misses, rejected, evicted)
//!   └── sweeper: Mutex<Option<SweeperHandle>>
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use isrv_common::{CacheConfig, IsrvResult};

use crate::key::CacheKey;
use crate::sweeper::{self, SweeperHandle};

const SHARD_COUNT: usize = 16;

/// A memoized command result.
#[derive(Debug)]
pub struct CacheEntry {
    result: Arc<str>,
    created_at: Instant,
    /// Nanoseconds since the cache epoch.
    last_accessed: AtomicU64,
}

impl CacheEntry {
    fn new(result: Arc<str>, now: Instant, offset: u64) -> Self {
        CacheEntry {
            result,
            created_at: now,
            last_accessed: AtomicU64::new(offset),
        }
    }

    pub fn result(&self) -> &str {
        &self.result
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    fn touch(&self, offset: u64) {
        // Concurrent readers may race; keep the most recent access.
        self.last_accessed.fetch_max(offset, Ordering::Relaxed);
    }

    fn idle_for(&self, offset: u64) -> u64 {
        offset.saturating_sub(self.last_accessed.load(Ordering::Relaxed))
    }
}

/// Result of a `put` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// A new entry was created.
    Inserted,
    /// An existing entry for the key was overwritten.
    Replaced,
    /// The cache was full; nothing changed.
    Rejected,
}

/// Point-in-time counters for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub rejected: u64,
    pub evicted: u64,
}

type Shard = RwLock<HashMap<CacheKey, CacheEntry, RandomState>>;

/// State shared between the cache handle and the sweeper thread.
pub(crate) struct Shared {
    shards: Box<[Shard]>,
    hasher: RandomState,
    len: AtomicUsize,
    capacity: usize,
    ttl: Duration,
    epoch: Instant,
    hits: AtomicU64,
    misses: AtomicU64,
    rejected: AtomicU64,
    evicted: AtomicU64,
}

impl Shared {
    fn new(capacity: usize, ttl: Duration) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::with_hasher(RandomState::new())))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Shared {
            shards,
            hasher: RandomState::new(),
            len: AtomicUsize::new(0),
            capacity,
            ttl,
            epoch: Instant::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    fn shard(&self, key: &CacheKey) -> &Shard {
        let idx = (self.hasher.hash_one(key) as usize) % self.shards.len();
        &self.shards[idx]
    }

    fn offset(&self, now: Instant) -> u64 {
        saturating_nanos(now.saturating_duration_since(self.epoch))
    }

    fn get_at(&self, key: &CacheKey, now: Instant) -> Option<Arc<str>> {
        let shard = self.shard(key).read();
        match shard.get(key) {
            Some(entry) => {
                entry.touch(self.offset(now));
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.result))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn put_at(&self, key: CacheKey, result: Arc<str>, now: Instant) -> PutOutcome {
        let offset = self.offset(now);
        let mut shard = self.shard(&key).write();

        if let Some(entry) = shard.get_mut(&key) {
            *entry = CacheEntry::new(result, now, offset);
            return PutOutcome::Replaced;
        }

        let reserved = self
            .len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |len| {
                (len < self.capacity).then_some(len + 1)
            });
        if reserved.is_err() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, capacity = self.capacity, "cache is full, result not cached");
            return PutOutcome::Rejected;
        }

        shard.insert(key, CacheEntry::new(result, now, offset));
        PutOutcome::Inserted
    }

    pub(crate) fn clean_at(&self, now: Instant) -> usize {
        let offset = self.offset(now);
        let ttl = saturating_nanos(self.ttl);
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut guard = shard.write();
            let before = guard.len();
            guard.retain(|_, entry| entry.idle_for(offset) <= ttl);
            let gone = before - guard.len();
            if gone > 0 {
                self.len.fetch_sub(gone, Ordering::AcqRel);
                removed += gone;
            }
        }
        self.evicted.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    fn clear(&self) {
        for shard in self.shards.iter() {
            let mut guard = shard.write();
            self.len.fetch_sub(guard.len(), Ordering::AcqRel);
            guard.clear();
        }
    }
}

/// Capacity-bounded response cache with a background sweeper.
pub struct ResponseCache {
    shared: Arc<Shared>,
    sweep_interval: Duration,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl ResponseCache {
    /// Creates an empty cache. The sweeper is not running until
    /// [`ResponseCache::start_sweeper`] is called.
    pub fn new(config: &CacheConfig) -> Self {
        ResponseCache {
            shared: Arc::new(Shared::new(config.capacity, config.ttl())),
            sweep_interval: config.sweep_interval(),
            sweeper: Mutex::new(None),
        }
    }

    /// Returns the cached result and refreshes the entry's last access.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<str>> {
        self.shared.get_at(key, Instant::now())
    }

    /// Caches a result unless the cache is at capacity.
    pub fn put(&self, key: CacheKey, result: impl Into<Arc<str>>) -> PutOutcome {
        self.shared.put_at(key, result.into(), Instant::now())
    }

    /// Evicts every entry idle for longer than the TTL; returns how many.
    pub fn clean(&self) -> usize {
        self.shared.clean_at(Instant::now())
    }

    /// Spawns the sweeper thread. Calling it while a sweeper runs is a no-op.
    pub fn start_sweeper(&self) -> IsrvResult<()> {
        let mut slot = self.sweeper.lock();
        if slot.is_none() {
            *slot = Some(sweeper::spawn(Arc::clone(&self.shared), self.sweep_interval)?);
            debug!(interval_ms = self.sweep_interval.as_millis() as u64, "cache sweeper started");
        }
        Ok(())
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Stops the sweeper and drops every entry.
    ///
    /// The cache stays usable afterwards: lookups miss and inserts land in an
    /// empty map.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.stop();
        }
        self.shared.clear();
        info!("response cache shut down");
    }

    pub fn len(&self) -> usize {
        self.shared.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.shared.capacity,
            hits: self.shared.hits.load(Ordering::Relaxed),
            misses: self.shared.misses.load(Ordering::Relaxed),
            rejected: self.shared.rejected.load(Ordering::Relaxed),
            evicted: self.shared.evicted.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ResponseCache {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.stop();
        }
    }
}

/// Durations beyond ~584 years clamp instead of wrapping.
fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
