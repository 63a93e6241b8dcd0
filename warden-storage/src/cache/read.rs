//! Cache read results carrying hit/miss metadata.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Result of a cache read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    /// When this value was cached (or fetched from storage).
    cached_at: DateTime<Utc>,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// Create a new cache read from a cache hit.
    pub fn from_cache(value: T, cached_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: true,
        }
    }

    /// Create a new cache read from a storage fetch (cache miss).
    pub fn from_storage(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at: fetched_at,
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Duration between caching and `now`; zero if `now` is earlier.
    pub fn staleness(&self, now: DateTime<Utc>) -> Duration {
        (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness_measured_from_cached_at() {
        let cached_at = Utc::now();
        let read = CacheRead::from_cache(5, cached_at);
        assert!(read.was_cache_hit());
        assert_eq!(
            read.staleness(cached_at + chrono::Duration::seconds(3)),
            Duration::from_secs(3)
        );
        assert_eq!(
            read.staleness(cached_at - chrono::Duration::seconds(3)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_map_preserves_metadata() {
        let at = Utc::now();
        let read = CacheRead::from_storage(2, at).map(|v| v * 10);
        assert!(read.was_cache_miss());
        assert_eq!(*read.value(), 20);
        assert_eq!(read.cached_at(), at);
    }
}
