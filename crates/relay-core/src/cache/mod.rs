//! Response caching

mod entry;
mod manager;
mod store;

pub use entry::CachedResponse;
pub use manager::{CacheStats, Lookup, ResponseCache};
pub use store::{Keys, LruStore};
