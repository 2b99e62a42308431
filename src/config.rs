//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default upstream URL; `{id}` is replaced with the entity id.
pub const DEFAULT_UPSTREAM_URL_TEMPLATE: &str = "http://localhost:8080/entities/{id}";

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// TTL in seconds for cached entity payloads
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Largest id list accepted by the batch endpoint
    pub max_batch_ids: usize,
    /// Upstream URL with an `{id}` placeholder
    pub upstream_url_template: String,
    /// Per-request upstream deadline in seconds
    pub upstream_timeout: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `DEFAULT_TTL` - Entity TTL in seconds (default: 300)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 60)
    /// - `MAX_BATCH_IDS` - Batch request size limit (default: 500)
    /// - `UPSTREAM_URL_TEMPLATE` - Upstream entity URL (default: `http://localhost:8080/entities/{id}`)
    /// - `UPSTREAM_TIMEOUT` - Upstream deadline in seconds (default: 10)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: parse_var("MAX_ENTRIES").unwrap_or(defaults.max_entries),
            default_ttl: parse_var("DEFAULT_TTL").unwrap_or(defaults.default_ttl),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_var("CLEANUP_INTERVAL")
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.cleanup_interval),
            max_batch_ids: parse_var("MAX_BATCH_IDS").unwrap_or(defaults.max_batch_ids),
            upstream_url_template: env::var("UPSTREAM_URL_TEMPLATE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.upstream_url_template),
            upstream_timeout: parse_var("UPSTREAM_TIMEOUT")
                .unwrap_or(defaults.upstream_timeout),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: 300,
            server_port: 3000,
            cleanup_interval: 60,
            max_batch_ids: 500,
            upstream_url_template: DEFAULT_UPSTREAM_URL_TEMPLATE.to_string(),
            upstream_timeout: 10,
        }
    }
}
