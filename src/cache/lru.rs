//! LRU Tracker Module
//!
//! Implements Least Recently Used tracking for cache eviction.

use std::collections::{BTreeMap, HashMap};

use crate::cache::CacheKey;

/// Position of a key in the recency order: `(last_access, inserted_at)`.
///
/// Ordering on the tuple gives oldest access first and, for equal access
/// ticks, earliest insertion first.
pub type Recency = (u64, u64);

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Holds only keys and their recency, never payloads.
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Keys ordered from least to most recently used
    order: BTreeMap<Recency, CacheKey>,
    /// Current position of every tracked key
    positions: HashMap<CacheKey, Recency>,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Places `key` at `recency`, replacing any previous position.
    pub fn touch(&mut self, key: CacheKey, recency: Recency) {
        if let Some(old) = self.positions.insert(key, recency) {
            self.order.remove(&old);
        }
        self.order.insert(recency, key);
    }

    // == Remove ==
    /// Removes a key from the tracker.
    pub fn remove(&mut self, key: &CacheKey) {
        if let Some(old) = self.positions.remove(key) {
            self.order.remove(&old);
        }
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    ///
    /// Returns None if tracker is empty.
    pub fn evict_oldest(&mut self) -> Option<CacheKey> {
        let (_, key) = self.order.pop_first()?;
        self.positions.remove(&key);
        Some(key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&CacheKey> {
        self.order.values().next()
    }

    /// Keys from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = &CacheKey> {
        self.order.values()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.positions.clear();
    }
}
