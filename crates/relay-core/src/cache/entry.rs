//! Cached origin responses

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};

/// An origin response captured for replay.
///
/// Immutable once built: re-caching the same key replaces the whole value.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub body: Bytes,
    pub headers: HeaderMap,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(
        status: StatusCode,
        body: Bytes,
        headers: HeaderMap,
        stored_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status,
            body,
            headers,
            stored_at,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whole seconds elapsed since the response was stored, for the `Age` header
    pub fn age_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.stored_at).num_seconds().max(0) as u64
    }

    /// Length of the freshness window this entry was stored with
    pub fn lifetime_secs(&self) -> u64 {
        (self.expires_at - self.stored_at).num_seconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn response(stored_at: DateTime<Utc>, ttl: i64) -> CachedResponse {
        CachedResponse::new(
            StatusCode::OK,
            Bytes::from_static(b"hello"),
            HeaderMap::new(),
            stored_at,
            stored_at + Duration::seconds(ttl),
        )
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let cached = response(now, 60);

        assert!(!cached.is_expired(now));
        assert!(!cached.is_expired(now + Duration::seconds(60)));
        assert!(cached.is_expired(now + Duration::seconds(61)));
    }

    #[test]
    fn test_age_counts_from_storage() {
        let now = Utc::now();
        let cached = response(now - Duration::seconds(42), 3600);

        assert_eq!(cached.age_secs(now), 42);
        assert_eq!(cached.lifetime_secs(), 3600);
        // Clock skew never yields a negative age
        assert_eq!(cached.age_secs(now - Duration::seconds(100)), 0);
    }
}
