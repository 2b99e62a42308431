//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU tracking and TTL expiration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, Clock, LruTracker, SystemClock};

// == Cache Store ==
/// Bounded TTL cache with LRU eviction and lifetime counters.
///
/// Expiration is lazy: an expired entry is dropped the next time it is read.
/// `cleanup` reclaims expired entries proactively but is never required for
/// correct reads.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_size: usize,
    /// Time source for expiration
    clock: Arc<dyn Clock>,
}

impl<V> CacheStore<V>
where
    V: Clone + Serialize,
{
    // == Constructor ==
    /// Creates a store holding at most `max_size` entries, using wall-clock time.
    pub fn new(max_size: usize) -> Self {
        Self::with_clock(max_size, Arc::new(SystemClock))
    }

    /// Creates a store with an explicit time source.
    pub fn with_clock(max_size: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(max_size),
            max_size,
            clock,
        }
    }

    // == Get ==
    /// Returns a clone of the live value stored under `key`.
    ///
    /// Absent and expired keys are both misses; an expired entry is removed
    /// on the way out.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();

        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_miss();
            debug!(key, "cache miss (expired)");
            return None;
        }

        self.stats.record_hit();
        self.lru.touch(key);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Set ==
    /// Stores `value` under `key` for `ttl`.
    ///
    /// Overwriting an existing key never evicts. Inserting a new key into a
    /// full cache evicts least recently used entries first.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        if self.max_size == 0 {
            return;
        }

        if let Some(previous) = self.entries.remove(&key) {
            self.stats.memory_usage_bytes -= previous.approx_size_bytes;
        } else {
            while self.entries.len() >= self.max_size {
                let Some(evicted) = self.lru.evict_oldest() else {
                    break;
                };
                if let Some(entry) = self.entries.remove(&evicted) {
                    self.stats.memory_usage_bytes -= entry.approx_size_bytes;
                }
                self.stats.record_eviction();
                debug!(key = %evicted, "evicted least recently used entry");
            }
        }

        let entry = CacheEntry::new(
            key.clone(),
            value,
            self.clock.now_ms(),
            ttl.as_millis() as u64,
        );
        self.stats.memory_usage_bytes += entry.approx_size_bytes;
        self.entries.insert(key.clone(), entry);
        self.lru.touch(&key);
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether an entry was present.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key)
    }

    // == Clear ==
    /// Drops every entry. Lifetime counters are preserved.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats.memory_usage_bytes = 0;
    }

    /// Resets hit, miss and eviction counters.
    pub fn clear_stats(&mut self) {
        self.stats.reset_counters();
    }

    // == Cleanup ==
    /// Removes all expired entries. Returns the number removed.
    pub fn cleanup(&mut self) -> usize {
        let now = self.clock.now_ms();
        let expired_keys: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
        }
        expired_keys.len()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.size = self.entries.len();
        stats
    }

    // == Contains Live ==
    /// Checks whether a non-expired entry exists, without touching counters or LRU order.
    pub fn contains_live(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remaining lifetime of a live entry.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_ms();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| Duration::from_millis(entry.ttl_remaining_ms(now)))
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the current number of entries, including expired ones not yet reaped.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.lru.remove(key);
                self.stats.memory_usage_bytes -= entry.approx_size_bytes;
                true
            }
            None => false,
        }
    }
}
