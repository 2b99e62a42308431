//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use serde::Serialize;

// == Cache Entry ==
/// A single cached value with its expiration metadata.
///
/// Entries are owned by the `CacheStore`; readers only ever see clones of
/// `value`.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Key the entry is stored under
    pub key: String,
    /// The stored value
    pub value: V,
    /// Insertion timestamp (Unix milliseconds)
    pub inserted_at: u64,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Approximate memory footprint used for accounting
    pub approx_size_bytes: usize,
}

impl<V: Serialize> CacheEntry<V> {
    // == Constructor ==
    /// Creates an entry that expires `ttl_ms` after `now_ms`.
    pub fn new(key: String, value: V, now_ms: u64, ttl_ms: u64) -> Self {
        let approx_size_bytes = estimate_size(&key, &value);
        Self {
            key,
            value,
            inserted_at: now_ms,
            expires_at: now_ms.saturating_add(ttl_ms),
            approx_size_bytes,
        }
    }
}

impl<V> CacheEntry<V> {
    // == Is Expired ==
    /// Checks if the entry has expired at `now_ms`.
    ///
    /// An entry is expired once the current time reaches `expires_at`, so a
    /// zero TTL produces an entry that is never readable.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    // == Time To Live ==
    /// Returns the remaining TTL in milliseconds, `0` once expired.
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> u64 {
        self.expires_at.saturating_sub(now_ms)
    }
}

// == Utility Functions ==
/// Estimates the memory held by an entry: key bytes plus the JSON encoding
/// of the value. Values that fail to serialize count as their key only.
fn estimate_size<V: Serialize>(key: &str, value: &V) -> usize {
    let value_bytes = serde_json::to_vec(value).map(|b| b.len()).unwrap_or(0);
    key.len() + value_bytes
}
