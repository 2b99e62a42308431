//! Cache Introspection Module
//!
//! Derives health metrics and operator recommendations from a `CacheStats`
//! snapshot. Nothing here feeds back into cache behaviour.

use serde::Serialize;

use crate::cache::CacheStats;

/// Hit rate below which a longer TTL is recommended.
pub const LOW_HIT_RATE_THRESHOLD: f64 = 0.4;

/// Evictions above this fraction of hits indicate an undersized cache.
pub const EVICTION_PRESSURE_THRESHOLD: f64 = 0.1;

/// Upper bound (exclusive) of the `Low` memory band.
pub const MEMORY_LOW_BYTES: usize = 10 * 1024 * 1024;

/// Upper bound (exclusive) of the `Moderate` memory band.
pub const MEMORY_MODERATE_BYTES: usize = 50 * 1024 * 1024;

// == Memory Level ==
/// Coarse classification of the cache's estimated memory footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLevel {
    Low,
    Moderate,
    High,
}

impl MemoryLevel {
    pub fn from_bytes(bytes: usize) -> Self {
        if bytes < MEMORY_LOW_BYTES {
            MemoryLevel::Low
        } else if bytes < MEMORY_MODERATE_BYTES {
            MemoryLevel::Moderate
        } else {
            MemoryLevel::High
        }
    }
}

// == Cache Insights ==
/// Extended metrics computed purely from a stats snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInsights {
    pub hit_rate: f64,
    pub total_requests: u64,
    pub memory_usage_bytes: usize,
    pub memory_usage_mb: f64,
    pub memory_level: MemoryLevel,
    /// size / max_size, 0 for a zero-capacity cache
    pub capacity_utilization: f64,
    /// evictions / hits, 0 when there are no hits
    pub eviction_pressure: f64,
    pub recommendations: Vec<String>,
}

impl CacheInsights {
    pub fn from_stats(stats: &CacheStats) -> Self {
        let hit_rate = stats.hit_rate();
        let memory_level = MemoryLevel::from_bytes(stats.memory_usage_bytes);

        let capacity_utilization = if stats.max_size == 0 {
            0.0
        } else {
            stats.size as f64 / stats.max_size as f64
        };
        let eviction_pressure = if stats.hits == 0 {
            0.0
        } else {
            stats.evictions as f64 / stats.hits as f64
        };

        let mut recommendations = Vec::new();
        if stats.total_requests() > 0 && hit_rate < LOW_HIT_RATE_THRESHOLD {
            recommendations.push(format!(
                "Low hit rate ({:.1}%): consider increasing TTL for frequently requested data",
                hit_rate * 100.0
            ));
        }
        if stats.evictions as f64 > stats.hits as f64 * EVICTION_PRESSURE_THRESHOLD {
            recommendations.push(format!(
                "High eviction count ({} evictions for {} hits): consider increasing cache size",
                stats.evictions, stats.hits
            ));
        }
        if stats.max_size > 0 && stats.size == stats.max_size {
            recommendations.push(format!(
                "Cache is at capacity ({} entries)",
                stats.max_size
            ));
        }
        if memory_level == MemoryLevel::High {
            recommendations.push(
                "High memory usage: consider reducing TTL or cache size".to_string(),
            );
        }

        Self {
            hit_rate,
            total_requests: stats.total_requests(),
            memory_usage_bytes: stats.memory_usage_bytes,
            memory_usage_mb: stats.memory_usage_bytes as f64 / (1024.0 * 1024.0),
            memory_level,
            capacity_utilization,
            eviction_pressure,
            recommendations,
        }
    }

    /// True when no recommendation was raised.
    pub fn is_healthy(&self) -> bool {
        self.recommendations.is_empty()
    }
}
