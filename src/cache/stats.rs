//! Cache Statistics Module
//!
//! Tracks disk store metrics including hits, misses, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks disk store performance metrics.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of successful lookups
    pub hits: u64,
    /// Number of failed lookups (absent, expired or corrupt)
    pub misses: u64,
    /// Number of entries evicted due to LRU policy
    pub evictions: u64,
    /// Number of entries dropped for exceeding max age
    pub expirations: u64,
    /// Number of entries dropped after failing validation
    pub corrupt_entries: u64,
    /// Current number of entries in the store
    pub total_entries: usize,
    /// Current payload bytes in the store
    pub total_bytes: u64,
    /// Configured capacity in bytes
    pub max_capacity_bytes: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new(max_capacity_bytes: u64) -> Self {
        Self {
            max_capacity_bytes,
            ..Self::default()
        }
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    pub fn record_corruption(&mut self) {
        self.corrupt_entries += 1;
    }

    // == Update Usage ==
    /// Updates the entry count and byte usage snapshot.
    pub fn set_usage(&mut self, entries: usize, bytes: u64) {
        self.total_entries = entries;
        self.total_bytes = bytes;
    }
}
