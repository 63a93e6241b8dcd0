//! Cache provider trait and statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use warden_core::{IndexEntry, Record};

/// A cache that participates in broadcast invalidation.
///
/// Implementations must tolerate being called from any thread, including
/// concurrently with their own reads.
pub trait CacheProvider: Send + Sync {
    /// Human-readable name for logs and stats.
    fn name(&self) -> &str;

    fn clear_all(&self);

    /// Evict the entry stored under `key` (a locator digest or query hash).
    fn clear_key(&self, key: &str);

    fn clear_model(&self, model: &str);

    /// Evict every entry holding a record identity-equal to `record`.
    fn clear_record(&self, record: &Record);

    fn clear_index(&self, entry: &IndexEntry);

    fn stats(&self) -> CacheStats;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of entries removed by invalidation, sweeps, or capacity.
    pub evictions: u64,
    /// Number of hits rejected because the cached model did not match.
    pub collisions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters backing [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub collisions: AtomicU64,
}

impl StatCounters {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn evicted(&self, n: usize) {
        self.evictions.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn collision(&self) {
        self.collisions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entry_count: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: entry_count as u64,
            evictions: self.evictions.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = StatCounters::default();
        counters.hit();
        counters.miss();
        counters.miss();
        counters.evicted(3);
        counters.collision();
        let stats = counters.snapshot(5);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.evictions, 3);
        assert_eq!(stats.collisions, 1);
        assert_eq!(stats.entry_count, 5);
    }
}
