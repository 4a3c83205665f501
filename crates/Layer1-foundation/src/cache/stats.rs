//! Cache statistics
//!
//! Counters are atomics so hits can be recorded while only a shared read
//! lock is held. [`CacheStats`] is the on-demand snapshot.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a lookup was served
///
/// Callers append [`CacheStatus::marker`] instead of re-inserting content
/// the model has already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CacheStatus {
    Miss,
    Hit,
    /// Served from a similar, not identical, key
    FuzzyHit,
}

impl CacheStatus {
    pub fn marker(&self) -> &'static str {
        match self {
            CacheStatus::Miss => "",
            CacheStatus::Hit => "(cached)",
            CacheStatus::FuzzyHit => "(cached, similar query)",
        }
    }

    pub fn is_hit(&self) -> bool {
        !matches!(self, CacheStatus::Miss)
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, CacheStatus::Hit)
    }
}

/// Live counters owned by one cache
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    fuzzy_hits: AtomicU64,
    misses: AtomicU64,
    bytes_saved: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    lock_failures: AtomicU64,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, bytes: usize) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.bytes_saved.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_fuzzy_hit(&self, bytes: usize) {
        self.fuzzy_hits.fetch_add(1, Ordering::Relaxed);
        self.bytes_saved.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_invalidations(&self, count: usize) {
        self.invalidations.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Lock acquisition failures also count as misses
    pub fn record_lock_failure(&self) {
        self.lock_failures.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entries: usize, bytes: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            fuzzy_hits: self.fuzzy_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bytes_saved: self.bytes_saved.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            lock_failures: self.lock_failures.load(Ordering::Relaxed),
            entries,
            bytes,
        }
    }
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub fuzzy_hits: u64,
    pub misses: u64,
    /// Approximate bytes kept out of the context window
    pub bytes_saved: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub lock_failures: u64,
    pub entries: usize,
    pub bytes: usize,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.fuzzy_hits + self.misses
    }

    /// Exact and fuzzy hits over all lookups
    pub fn hit_rate(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            (self.hits + self.fuzzy_hits) as f64 / total as f64
        }
    }

    pub fn miss_rate(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            self.misses as f64 / total as f64
        }
    }

    /// Sum of two snapshots
    pub fn combined(&self, other: &CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits + other.hits,
            fuzzy_hits: self.fuzzy_hits + other.fuzzy_hits,
            misses: self.misses + other.misses,
            bytes_saved: self.bytes_saved + other.bytes_saved,
            evictions: self.evictions + other.evictions,
            invalidations: self.invalidations + other.invalidations,
            lock_failures: self.lock_failures + other.lock_failures,
            entries: self.entries + other.entries,
            bytes: self.bytes + other.bytes,
        }
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} entries ({} bytes), hit rate {:.1}%, {} bytes saved",
            self.entries,
            self.bytes,
            self.hit_rate() * 100.0,
            self.bytes_saved
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates() {
        let counters = CacheCounters::new();
        counters.record_hit(100);
        counters.record_fuzzy_hit(50);
        counters.record_miss();
        counters.record_lock_failure();

        let stats = counters.snapshot(3, 400);
        assert_eq!(stats.lookups(), 4);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
        assert!((stats.miss_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.bytes_saved, 150);
        assert_eq!(stats.lock_failures, 1);
    }

    #[test]
    fn test_markers() {
        assert_eq!(CacheStatus::Miss.marker(), "");
        assert_eq!(CacheStatus::Hit.marker(), "(cached)");
        assert_eq!(CacheStatus::FuzzyHit.marker(), "(cached, similar query)");
        assert!(CacheStatus::FuzzyHit.is_hit());
        assert!(!CacheStatus::FuzzyHit.is_exact());
    }

    #[test]
    fn test_empty_rates_are_zero() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 0.0);
    }

    #[test]
    fn test_combined() {
        let a = CacheStats {
            hits: 2,
            entries: 1,
            ..Default::default()
        };
        let b = CacheStats {
            misses: 2,
            entries: 4,
            ..Default::default()
        };
        let sum = a.combined(&b);
        assert_eq!(sum.lookups(), 4);
        assert_eq!(sum.entries, 5);
    }
}
