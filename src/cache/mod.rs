//! Cache Module
//!
//! Disk-backed payload storage with byte-bounded LRU eviction, plus the key
//! codec that maps request descriptors to storage keys.

mod entry;
mod index;
mod key;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use key::{compute_key, CacheKey, RequestDescriptor};
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::DiskStore;
