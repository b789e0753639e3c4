//! Resource Cache - a disk-backed LRU cache in front of network fetches
//!
//! Requests are identified by a locator plus variant parameters, stored on
//! disk under a digest key, bounded by total bytes with LRU eviction, and
//! fetched from the network on a miss with concurrent misses collapsed into
//! a single fetch.

pub mod api;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{compute_key, CacheKey, DiskStore, RequestDescriptor};
pub use config::{CacheOptions, Config};
pub use coordinator::{RequestCoordinator, Resolved, Source};
pub use error::{CacheError, ErrorReporter, FetchError};
pub use fetch::{Fetcher, HttpFetcher};
pub use tasks::spawn_cleanup_task;
