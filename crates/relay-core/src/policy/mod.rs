//! Caching decisions for proxied GET requests
//!
//! Two checkpoints per request: [`CachePolicy::pre_fetch`] looks at the
//! client's headers before the cache is consulted, and
//! [`CachePolicy::post_fetch`] looks at the origin's headers before a fetched
//! response is stored.

mod directives;

pub use directives::{CacheDirectives, parse_cache_control};

use chrono::{DateTime, TimeDelta, Utc};
use http::{HeaderMap, HeaderName, StatusCode, header};
use sha2::{Digest, Sha256};

/// Lifetime given to stored responses when neither side sets a max-age (365 days)
pub const DEFAULT_HORIZON_SECS: u64 = 365 * 24 * 60 * 60;

/// Derive the cache key for a request path.
///
/// Only the path is hashed: method, query string and headers are not part of
/// the key, so `/a?x=1` and `/a?x=2` share an entry.
pub fn cache_key(path: &str) -> String {
    hex::encode(Sha256::digest(path.as_bytes()))
}

/// Result of inspecting the client's request headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDecision {
    /// Whether the cache may be read and, on a miss, populated
    pub use_cache: bool,
    /// Freshness bound requested by the client, 0 when unspecified
    pub client_max_age: u64,
}

impl RequestDecision {
    fn bypass() -> Self {
        Self {
            use_cache: false,
            client_max_age: 0,
        }
    }

    fn cache(client_max_age: u64) -> Self {
        Self {
            use_cache: true,
            client_max_age,
        }
    }
}

/// Result of inspecting the origin's response headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageDecision {
    /// Storage allowed with the resolved max-age (0 means the default horizon)
    Store { max_age: u64 },
    /// Origin forbade storage
    DoNotStore,
}

/// Cache policy engine
#[derive(Debug, Clone)]
pub struct CachePolicy {
    enabled: bool,
    default_horizon_secs: u64,
}

impl CachePolicy {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            default_horizon_secs: DEFAULT_HORIZON_SECS,
        }
    }

    /// Override the lifetime used when no max-age was resolved
    pub fn with_default_horizon(mut self, secs: u64) -> Self {
        self.default_horizon_secs = secs;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn default_horizon_secs(&self) -> u64 {
        self.default_horizon_secs
    }

    /// Decide from the client's `Cache-Control` and `Pragma` whether the cache applies
    pub fn pre_fetch(&self, request_headers: &HeaderMap) -> RequestDecision {
        if !self.enabled {
            return RequestDecision::bypass();
        }

        if let Some(value) = joined_header(request_headers, header::CACHE_CONTROL) {
            let directives = parse_cache_control(&value);
            if directives.no_store || directives.no_cache {
                return RequestDecision::bypass();
            }
            if directives.max_age > 0 {
                return RequestDecision::cache(directives.max_age);
            }
        }

        let pragma_no_cache = request_headers
            .get_all(header::PRAGMA)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.trim().eq_ignore_ascii_case("no-cache"));
        if pragma_no_cache {
            return RequestDecision::bypass();
        }

        RequestDecision::cache(0)
    }

    /// Decide from the origin's `Cache-Control` whether and how long to store.
    ///
    /// An origin `no-store`/`no-cache` always wins. Otherwise the client's
    /// max-age takes precedence and the origin's is used only when the client
    /// gave none.
    pub fn post_fetch(&self, response_headers: &HeaderMap, client_max_age: u64) -> StorageDecision {
        let Some(value) = joined_header(response_headers, header::CACHE_CONTROL) else {
            return StorageDecision::Store {
                max_age: client_max_age,
            };
        };

        let directives = parse_cache_control(&value);
        if directives.no_store || directives.no_cache {
            return StorageDecision::DoNotStore;
        }

        if directives.max_age > 0 && client_max_age == 0 {
            return StorageDecision::Store {
                max_age: directives.max_age,
            };
        }

        StorageDecision::Store {
            max_age: client_max_age,
        }
    }

    /// Combine both checkpoints: returns the max-age to store with, or `None`.
    ///
    /// Only `200 OK` responses are ever stored.
    pub fn storable(
        &self,
        request: RequestDecision,
        status: StatusCode,
        storage: StorageDecision,
    ) -> Option<u64> {
        match storage {
            StorageDecision::Store { max_age } if request.use_cache && status == StatusCode::OK => {
                Some(max_age)
            }
            _ => None,
        }
    }

    /// Absolute expiry for a response stored at `now` with `max_age`
    pub fn expires_at(&self, now: DateTime<Utc>, max_age: u64) -> DateTime<Utc> {
        let secs = if max_age > 0 {
            max_age
        } else {
            self.default_horizon_secs
        };

        i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// All values of a header joined with commas; `None` when absent or blank
fn joined_header(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join(","))
    }
}
