//! Operation counters for a disk cache
//!
//! Counters are updated from the cache worker and can be snapshotted from any
//! thread.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one cache instance
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    failed_writes: AtomicU64,
    removals: AtomicU64,
    evictions: AtomicU64,
    bytes_evicted: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    /// Fetches that found a blob
    pub hits: u64,
    /// Fetches that found nothing or failed
    pub misses: u64,
    /// Successful writes
    pub writes: u64,
    /// Writes that failed or whose producer yielded nothing
    pub failed_writes: u64,
    /// Blobs removed explicitly
    pub removals: u64,
    /// Blobs removed by capacity enforcement
    pub evictions: u64,
    /// Bytes released by capacity enforcement
    pub bytes_evicted: u64,
}

impl CacheStatsSnapshot {
    /// Hit rate as a percentage (0.0 to 100.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl CacheStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_write(&self) {
        self.failed_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_removal(&self) {
        self.removals.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `count` evictions releasing `bytes`
    pub fn record_evictions(&self, count: u64, bytes: u64) {
        if count > 0 {
            self.evictions.fetch_add(count, Ordering::Relaxed);
            self.bytes_evicted.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    /// Take a consistent-enough snapshot of all counters
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bytes_evicted: self.bytes_evicted.load(Ordering::Relaxed),
        }
    }
}
