//! Fetch Module
//!
//! Single-flight, cache-aside access to slow upstream APIs.

mod single_flight;

pub use single_flight::CachedFetcher;
