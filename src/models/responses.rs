//! Response DTOs for the resource cache API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::coordinator::CoordinatorStats;

/// Response body for DELETE /entries/:key
#[derive(Debug, Clone, Serialize)]
pub struct RemoveResponse {
    /// Success message
    pub message: String,
    /// The key that was removed
    pub key: String,
}

impl RemoveResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' removed successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /entries
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    /// Number of entries dropped
    pub removed: usize,
}

impl ClearResponse {
    pub fn new(removed: usize) -> Self {
        Self {
            message: format!("Removed {} entries", removed),
            removed,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of LRU evictions
    pub evictions: u64,
    pub expirations: u64,
    pub corrupt_entries: u64,
    /// Current number of entries on disk
    pub total_entries: usize,
    pub total_bytes: u64,
    pub max_capacity_bytes: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Network fetches issued
    pub fetches: u64,
    /// Requests served by joining an outstanding fetch
    pub coalesced: u64,
    /// Uncached fetches made through GET /fetch
    pub direct_fetches: u64,
    pub fetch_failures: u64,
    pub write_failures: u64,
    pub in_flight: usize,
}

impl From<CoordinatorStats> for StatsResponse {
    fn from(stats: CoordinatorStats) -> Self {
        let store = &stats.store;
        Self {
            hits: store.hits,
            misses: store.misses,
            evictions: store.evictions,
            expirations: store.expirations,
            corrupt_entries: store.corrupt_entries,
            total_entries: store.total_entries,
            total_bytes: store.total_bytes,
            max_capacity_bytes: store.max_capacity_bytes,
            hit_rate: store.hit_rate(),
            fetches: stats.fetches,
            coalesced: stats.coalesced,
            direct_fetches: stats.direct_fetches,
            fetch_failures: stats.fetch_failures,
            write_failures: stats.write_failures,
            in_flight: stats.in_flight,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
