//! Cache operation result types.
//!
//! [`CacheSource`] records where a value came from so callers and metrics can
//! distinguish a genuine hit from the various degraded paths; [`CacheResult`]
//! pairs it with the value itself.

use std::fmt;

/// Indicates where a cached value came from and what operations were performed
///
/// This type implements `Display` for use in logging and metrics:
/// ```
/// # use common_cache::CacheSource;
/// let source = CacheSource::PositiveCache;
/// println!("Cache result: {}", source); // "positive_cache"
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    // Value found cases
    /// Value was found in Redis cache
    PositiveCache,
    /// Cache miss - value loaded from producer function
    LoaderCacheMiss,
    /// Cache data was corrupted - value loaded from producer function
    LoaderCacheCorrupted,
    /// Redis was unavailable - value loaded from producer function
    LoaderRedisUnavailable,

    // Value not found cases
    /// Cache miss - producer function indicated value doesn't exist
    LoaderNotFoundCacheMiss,
    /// Cache was corrupted - producer function indicated value doesn't exist
    LoaderNotFoundCacheCorrupted,
    /// Redis was unavailable - producer function indicated value doesn't exist
    LoaderNotFoundRedisUnavailable,
}

impl fmt::Display for CacheSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheSource::PositiveCache => write!(f, "positive_cache"),
            CacheSource::LoaderCacheMiss => write!(f, "loader_cache_miss"),
            CacheSource::LoaderCacheCorrupted => write!(f, "loader_cache_corrupted"),
            CacheSource::LoaderRedisUnavailable => write!(f, "loader_redis_unavailable"),
            CacheSource::LoaderNotFoundCacheMiss => write!(f, "loader_not_found_cache_miss"),
            CacheSource::LoaderNotFoundCacheCorrupted => {
                write!(f, "loader_not_found_cache_corrupted")
            }
            CacheSource::LoaderNotFoundRedisUnavailable => {
                write!(f, "loader_not_found_redis_unavailable")
            }
        }
    }
}

/// Result of a cache operation with detailed source information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheResult<V> {
    /// The value, if found. None indicates the item doesn't exist
    pub value: Option<V>,

    /// Where the result came from - provides context for observability
    pub source: CacheSource,
}

impl<V> CacheResult<V> {
    /// Create a cache result with a value
    pub fn found(value: V, source: CacheSource) -> Self {
        Self {
            value: Some(value),
            source,
        }
    }

    /// Create a cache result indicating the value was not found
    pub fn not_found(source: CacheSource) -> Self {
        Self {
            value: None,
            source,
        }
    }

    /// Check if this was a cache hit
    pub fn was_cached(&self) -> bool {
        matches!(self.source, CacheSource::PositiveCache)
    }

    /// Check if the producer function was invoked
    pub fn invoked_producer(&self) -> bool {
        !self.was_cached()
    }

    /// Check if there was a cache infrastructure problem
    pub fn had_cache_problem(&self) -> bool {
        matches!(
            self.source,
            CacheSource::LoaderCacheCorrupted
                | CacheSource::LoaderRedisUnavailable
                | CacheSource::LoaderNotFoundCacheCorrupted
                | CacheSource::LoaderNotFoundRedisUnavailable
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_result_helpers() {
        let result: CacheResult<i32> = CacheResult::found(42, CacheSource::PositiveCache);
        assert_eq!(result.value, Some(42));
        assert!(result.was_cached());
        assert!(!result.invoked_producer());
        assert!(!result.had_cache_problem());

        let result: CacheResult<i32> = CacheResult::not_found(CacheSource::LoaderNotFoundCacheMiss);
        assert_eq!(result.value, None);
        assert!(!result.was_cached());
        assert!(result.invoked_producer());
        assert!(!result.had_cache_problem());

        let result: CacheResult<i32> = CacheResult::found(42, CacheSource::LoaderCacheCorrupted);
        assert!(result.had_cache_problem());
        assert!(result.invoked_producer());
        assert!(!result.was_cached());
    }

    #[test]
    fn test_redis_unavailable_helper() {
        let result: CacheResult<i32> = CacheResult::found(42, CacheSource::LoaderRedisUnavailable);
        assert!(result.had_cache_problem());
        assert!(result.invoked_producer());
        assert!(!result.was_cached());
    }

    #[test]
    fn test_cache_source_display() {
        assert_eq!(CacheSource::PositiveCache.to_string(), "positive_cache");
        assert_eq!(
            CacheSource::LoaderCacheMiss.to_string(),
            "loader_cache_miss"
        );
        assert_eq!(
            CacheSource::LoaderRedisUnavailable.to_string(),
            "loader_redis_unavailable"
        );

        let source = CacheSource::PositiveCache;
        assert_eq!(
            format!("Cache hit from: {source}"),
            "Cache hit from: positive_cache"
        );
    }
}
