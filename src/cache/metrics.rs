//! Cache Metrics
//!
//! Cache-line aligned counters for the smart cache, plus the rolling hit
//! and error rates reported by the network adaptation manager.

use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Cache Line Size
// =============================================================================

/// Cache line size for alignment (64 bytes on most modern CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

// =============================================================================
// Cache Metrics (Cache-Line Aligned)
// =============================================================================

/// Counters for one smart cache, aligned to prevent false sharing
#[repr(C, align(64))]
#[derive(Debug)]
pub struct CacheMetrics {
    /// Hits served from memory
    pub memory_hits: AtomicU64,
    /// Hits rehydrated from the durable store
    pub durable_hits: AtomicU64,
    /// Lookups that found nothing live
    pub misses: AtomicU64,
    /// Entries written
    pub puts: AtomicU64,
    /// Entries dropped to make room
    pub evictions: AtomicU64,
    /// Entries dropped because their TTL passed
    pub expirations: AtomicU64,
    /// Durable mirror writes that failed
    pub persist_failures: AtomicU64,
}

// Verify size at compile time
const _: () = assert!(std::mem::size_of::<CacheMetrics>() <= CACHE_LINE_SIZE);

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self {
            memory_hits: AtomicU64::new(0),
            durable_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            puts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_durable_hit(&self) {
        self.durable_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Create a snapshot of current metrics
    pub fn snapshot(&self, entry_count: usize) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            entry_count,
        }
    }
}

// =============================================================================
// Cache Stats Snapshot
// =============================================================================

/// Point-in-time snapshot of cache metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub memory_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub persist_failures: u64,
    /// Entries currently held in memory
    pub entry_count: usize,
}

impl CacheStatsSnapshot {
    /// Total hits from either source
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.durable_hits
    }

    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

// =============================================================================
// Rolling Rate
// =============================================================================

/// Halving average of boolean outcomes: `rate = (rate + outcome) / 2`
///
/// Each observation weighs as much as the whole history, so the value
/// reacts within a handful of observations.
#[derive(Debug, Default)]
pub struct RollingRate {
    bits: AtomicU64,
}

impl RollingRate {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Fold one outcome into the rate
    pub fn observe(&self, outcome: bool) {
        let sample = if outcome { 1.0 } else { 0.0 };
        let _ = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some(((f64::from_bits(bits) + sample) / 2.0).to_bits())
            });
    }

    /// Current rate in [0, 1]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_line_alignment() {
        assert_eq!(std::mem::align_of::<CacheMetrics>(), CACHE_LINE_SIZE);
        assert!(std::mem::size_of::<CacheMetrics>() <= CACHE_LINE_SIZE);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = CacheMetrics::new();

        metrics.record_memory_hit();
        metrics.record_durable_hit();
        metrics.record_miss();
        metrics.record_put();
        metrics.record_expirations(2);

        let snapshot = metrics.snapshot(4);
        assert_eq!(snapshot.hits(), 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.expirations, 2);
        assert_eq!(snapshot.entry_count, 4);
        assert!((snapshot.hit_ratio() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_empty_snapshot_ratio() {
        assert_eq!(CacheStatsSnapshot::default().hit_ratio(), 0.0);
    }

    #[test]
    fn test_rolling_rate_trends() {
        let rate = RollingRate::new();
        assert_eq!(rate.get(), 0.0);

        rate.observe(true);
        assert!((rate.get() - 0.5).abs() < f64::EPSILON);
        rate.observe(true);
        assert!((rate.get() - 0.75).abs() < f64::EPSILON);

        rate.observe(false);
        assert!((rate.get() - 0.375).abs() < f64::EPSILON);
    }
}
