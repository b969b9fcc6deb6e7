//! # Amulet DNS Cache
//!
//! Capacity-bounded LRU cache for upstream answers, keyed by
//! `(record type, lowercased domain)` with per-entry TTL expiry.
//!
//! Reads take the reader lock for the initial probe and a separate writer
//! critical section for the recency update, re-checking existence in
//! between; expired entries are dropped on access. A background sweeper
//! wakes every five seconds and removes whatever expired without being
//! touched.

#![warn(clippy::all)]

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

pub mod key;
pub mod lru;
pub mod record;

pub use key::CacheKey;
pub use record::CachedRecord;

use lru::LruList;

/// How often the background sweeper wakes.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Default cache capacity in entries.
pub const DEFAULT_CAPACITY: usize = 1000;

/// TTL-bounded LRU answer cache.
pub struct DnsCache {
    inner: RwLock<LruList>,
    stats: CacheStats,
    close_tx: watch::Sender<bool>,
}

impl DnsCache {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            inner: RwLock::new(LruList::new(capacity)),
            stats: CacheStats::default(),
            close_tx,
        }
    }

    /// Looks up a fresh record for `(domain, rtype)`.
    ///
    /// The probe runs under the read lock; on a fresh hit a second, write
    /// locked section re-checks existence and moves the entry to the head.
    /// An expired entry counts as a miss and is removed.
    pub fn get(&self, domain: &str, rtype: u16) -> Option<CachedRecord> {
        let key = CacheKey::new(domain, rtype);
        let now = Instant::now();

        {
            let inner = self.inner.read();
            match inner.peek(&key) {
                None => {
                    self.stats.record_miss();
                    return None;
                }
                Some(record) if record.is_expired(now) => {
                    // fall through to the write path to drop it
                }
                Some(_) => {}
            }
        }

        let record = self.inner.write().touch(&key, now);
        match record {
            Some(record) => {
                self.stats.record_hit();
                Some(record)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Stores a record, keyed by its type and the lowercased domain.
    /// Evicts the least-recently-used entry when over capacity.
    pub fn set(&self, domain: &str, record: CachedRecord) {
        let key = CacheKey::new(domain, record.rtype);
        let evicted = self.inner.write().insert(key, record);
        if let Some(evicted) = evicted {
            self.stats.record_eviction();
            debug!(key = %evicted, "Evicted least-recently-used cache entry");
        }
    }

    /// Drops the entry for `(domain, rtype)` if present.
    pub fn remove(&self, domain: &str, rtype: u16) {
        let key = CacheKey::new(domain, rtype);
        self.inner.write().remove(&key);
    }

    /// Removes every expired entry now. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let removed = self.inner.write().remove_expired(Instant::now());
        if removed > 0 {
            self.stats.record_expired(removed as u64);
        }
        removed
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Signals the sweeper task to stop.
    pub fn close(&self) {
        let _ = self.close_tx.send(true);
    }

    /// Spawns the background sweeper. It runs until [`DnsCache::close`].
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let mut closed = self.close_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!(removed, "Cache sweep");
                        }
                    }
                    changed = closed.changed() => {
                        if changed.is_err() || *closed.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// Counters for cache behavior.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    fn record_expired(&self, count: u64) {
        self.expired.fetch_add(count, Ordering::Relaxed);
    }

    /// Fresh hits served.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Misses, including expired-on-access entries.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Entries evicted for capacity.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Entries removed because they expired.
    pub fn expired(&self) -> u64 {
        self.expired.load(Ordering::Relaxed)
    }

    /// Hit ratio over all lookups.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}
