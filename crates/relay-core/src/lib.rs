//! Relay Core Logic
//!
//! This crate provides the caching and balancing core of the Relay proxy:
//! the LRU response store, the `Cache-Control` policy engine and the
//! round-robin backend selector.

pub mod cache;
pub mod error;
pub mod policy;
pub mod upstream;

pub use cache::{CacheStats, CachedResponse, Lookup, LruStore, ResponseCache};
pub use error::CoreError;
pub use policy::{
    CacheDirectives, CachePolicy, DEFAULT_HORIZON_SECS, RequestDecision, StorageDecision,
    cache_key, parse_cache_control,
};
pub use upstream::{BackendDescriptor, BackendPool};
