//! Read-through cache implementation with Redis backing.
//!
//! The access pattern:
//! 1. Try to get data from the Redis cache
//! 2. On cache miss, call the producer function
//! 3. If the producer succeeds with a value, store it under the key with the
//!    caller's TTL
//! 4. If the producer fails, cache nothing and propagate the error
//!
//! Cache-store failures on read are treated as a miss (fail open to the
//! producer); failures on write are logged and swallowed. A cache outage
//! degrades to "always hits the database", never to a failed request.

use crate::{CacheResult, CacheSource};
use common_redis::{Client as RedisClient, CustomRedisError};
use metrics::counter;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;

const CACHE_READS_COUNTER: &str = "read_through_cache_reads_total";
const CACHE_HIT_COUNTER: &str = "read_through_cache_hit_total";
const CACHE_PRODUCER_INVOKED_COUNTER: &str = "read_through_cache_producer_invoked_total";
const CACHE_WRITE_ERRORS_COUNTER: &str = "read_through_cache_write_errors_total";

/// A read-through cache over the shared Redis client.
///
/// Keys arrive fully derived (see the campaigns crate's key derivation) and
/// the TTL is chosen per call, so one instance serves every query class.
///
/// Concurrency: there is no per-key locking. Two requests racing on the same
/// missing key may both invoke the producer; the second write wins. This is
/// an accepted tradeoff, not an oversight.
pub struct ReadThroughCache {
    redis_client: Arc<dyn RedisClient + Send + Sync>,
}

impl ReadThroughCache {
    pub fn new(redis_client: Arc<dyn RedisClient + Send + Sync>) -> Self {
        Self { redis_client }
    }

    /// Get a value from cache or produce it.
    ///
    /// The producer returns `Result<Option<V>, E>`:
    /// - `Ok(Some(value))` - found; cached under `key` for `ttl_seconds`
    /// - `Ok(None)` - doesn't exist; nothing is cached
    /// - `Err(e)` - nothing is cached, `e` propagates to the caller unchanged
    ///
    /// On a cache hit the producer is not invoked.
    pub async fn get_with_fallback<V, E, F, Fut>(
        &self,
        key: &str,
        ttl_seconds: u64,
        producer: F,
    ) -> Result<CacheResult<V>, E>
    where
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
        E: Send + Sync,
    {
        counter!(CACHE_READS_COUNTER).increment(1);

        match self.redis_client.get(key.to_string()).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    counter!(CACHE_HIT_COUNTER, "cache_hit" => "true").increment(1);
                    tracing::debug!("cache hit for key: {}", key);
                    Ok(CacheResult::found(value, CacheSource::PositiveCache))
                }
                Err(err) => {
                    // Corrupted entry: reload from the producer and overwrite.
                    counter!(CACHE_HIT_COUNTER, "cache_hit" => "false").increment(1);
                    tracing::warn!(
                        "cache corruption for key {}: {}. refreshing from source",
                        key,
                        err
                    );
                    self.produce_and_store(
                        key,
                        ttl_seconds,
                        producer,
                        CacheSource::LoaderCacheCorrupted,
                        CacheSource::LoaderNotFoundCacheCorrupted,
                    )
                    .await
                }
            },
            Err(CustomRedisError::NotFound) => {
                counter!(CACHE_HIT_COUNTER, "cache_hit" => "false").increment(1);
                self.produce_and_store(
                    key,
                    ttl_seconds,
                    producer,
                    CacheSource::LoaderCacheMiss,
                    CacheSource::LoaderNotFoundCacheMiss,
                )
                .await
            }
            Err(err) => {
                // Store unreachable: fail open to the producer and skip the
                // cache write entirely.
                counter!(CACHE_HIT_COUNTER, "cache_hit" => "false").increment(1);
                tracing::warn!(
                    "cache store unavailable for key {}: {:?}. operating without cache",
                    key,
                    err
                );
                counter!(CACHE_PRODUCER_INVOKED_COUNTER).increment(1);
                match producer().await? {
                    Some(value) => Ok(CacheResult::found(
                        value,
                        CacheSource::LoaderRedisUnavailable,
                    )),
                    None => Ok(CacheResult::not_found(
                        CacheSource::LoaderNotFoundRedisUnavailable,
                    )),
                }
            }
        }
    }

    async fn produce_and_store<V, E, F, Fut>(
        &self,
        key: &str,
        ttl_seconds: u64,
        producer: F,
        found_source: CacheSource,
        not_found_source: CacheSource,
    ) -> Result<CacheResult<V>, E>
    where
        V: Serialize + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, E>>,
        E: Send + Sync,
    {
        counter!(CACHE_PRODUCER_INVOKED_COUNTER).increment(1);
        match producer().await? {
            Some(value) => {
                if let Err(err) = self.store(key, &value, ttl_seconds).await {
                    counter!(CACHE_WRITE_ERRORS_COUNTER).increment(1);
                    tracing::warn!("failed to update cache for key {}: {:?}", key, err);
                }
                Ok(CacheResult::found(value, found_source))
            }
            None => Ok(CacheResult::not_found(not_found_source)),
        }
    }

    async fn store<V>(&self, key: &str, value: &V, ttl_seconds: u64) -> Result<(), CustomRedisError>
    where
        V: Serialize,
    {
        let serialized = serde_json::to_string(value).map_err(|e| {
            CustomRedisError::ParseError(format!("Failed to serialize value for cache: {e}"))
        })?;

        self.redis_client
            .setex(key.to_string(), serialized, ttl_seconds)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_redis::MockRedisClient;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct TestData {
        id: i32,
        name: String,
    }

    fn test_data() -> TestData {
        TestData {
            id: 1,
            name: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_positive_cache_hit_skips_producer() {
        let client = Arc::new(MockRedisClient::new());
        client
            .setex(
                "campaign:1".to_string(),
                serde_json::to_string(&test_data()).unwrap(),
                60,
            )
            .await
            .unwrap();

        let cache = ReadThroughCache::new(client.clone());
        let result = cache
            .get_with_fallback("campaign:1", 60, || async {
                panic!("producer must not run on a cache hit");
                #[allow(unreachable_code)]
                Ok::<Option<TestData>, String>(None)
            })
            .await
            .unwrap();

        assert_eq!(result.value, Some(test_data()));
        assert_eq!(result.source, CacheSource::PositiveCache);
        assert!(result.was_cached());
    }

    #[tokio::test]
    async fn test_cache_miss_produces_and_stores() {
        let client = Arc::new(MockRedisClient::new());
        let cache = ReadThroughCache::new(client.clone());

        let data = test_data();
        let expected = data.clone();
        let result = cache
            .get_with_fallback("campaign:1", 60, || async move {
                Ok::<Option<TestData>, String>(Some(expected))
            })
            .await
            .unwrap();

        assert_eq!(result.value, Some(data));
        assert_eq!(result.source, CacheSource::LoaderCacheMiss);
        assert!(client.contains_key("campaign:1"));
        assert_eq!(client.call_count("setex"), 1);
    }

    #[tokio::test]
    async fn test_second_read_does_not_reinvoke_producer() {
        let client = Arc::new(MockRedisClient::new());
        let cache = ReadThroughCache::new(client.clone());
        let invocations = AtomicUsize::new(0);

        for _ in 0..2 {
            let result = cache
                .get_with_fallback("campaign:1", 60, || async {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Ok::<Option<TestData>, String>(Some(test_data()))
                })
                .await
                .unwrap();
            assert_eq!(result.value, Some(test_data()));
        }

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_producer_none_caches_nothing() {
        let client = Arc::new(MockRedisClient::new());
        let cache = ReadThroughCache::new(client.clone());

        let result = cache
            .get_with_fallback("campaign:missing", 60, || async {
                Ok::<Option<TestData>, String>(None)
            })
            .await
            .unwrap();

        assert_eq!(result.value, None);
        assert_eq!(result.source, CacheSource::LoaderNotFoundCacheMiss);
        assert!(!client.contains_key("campaign:missing"));
    }

    #[tokio::test]
    async fn test_producer_error_propagates_and_caches_nothing() {
        let client = Arc::new(MockRedisClient::new());
        let cache = ReadThroughCache::new(client.clone());

        let result = cache
            .get_with_fallback("campaign:1", 60, || async {
                Err::<Option<TestData>, String>("producer error".to_string())
            })
            .await;

        assert_eq!(result.unwrap_err(), "producer error");
        assert!(!client.contains_key("campaign:1"));

        // A subsequent successful call still reaches the producer: the
        // failure did not poison the cache.
        let result = cache
            .get_with_fallback("campaign:1", 60, || async {
                Ok::<Option<TestData>, String>(Some(test_data()))
            })
            .await
            .unwrap();
        assert_eq!(result.source, CacheSource::LoaderCacheMiss);
        assert_eq!(result.value, Some(test_data()));
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_refreshed() {
        let client = Arc::new(MockRedisClient::new());
        client
            .setex("campaign:1".to_string(), "invalid json{".to_string(), 60)
            .await
            .unwrap();

        let cache = ReadThroughCache::new(client.clone());
        let result = cache
            .get_with_fallback("campaign:1", 60, || async {
                Ok::<Option<TestData>, String>(Some(test_data()))
            })
            .await
            .unwrap();

        assert_eq!(result.value, Some(test_data()));
        assert_eq!(result.source, CacheSource::LoaderCacheCorrupted);
        assert!(result.had_cache_problem());

        // The bad entry was overwritten with valid data.
        let raw = client.get("campaign:1".to_string()).await.unwrap();
        assert_eq!(
            serde_json::from_str::<TestData>(&raw).unwrap(),
            test_data()
        );
    }

    #[tokio::test]
    async fn test_redis_unavailable_fails_open_without_write() {
        let mut mock = MockRedisClient::new();
        let client = Arc::new(mock.get_ret("campaign:1", Err(CustomRedisError::Timeout)));
        let cache = ReadThroughCache::new(client.clone());

        let result = cache
            .get_with_fallback("campaign:1", 60, || async {
                Ok::<Option<TestData>, String>(Some(test_data()))
            })
            .await
            .unwrap();

        assert_eq!(result.value, Some(test_data()));
        assert_eq!(result.source, CacheSource::LoaderRedisUnavailable);
        assert!(result.had_cache_problem());
        assert_eq!(client.call_count("setex"), 0);
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_non_fatal() {
        let mut mock = MockRedisClient::new();
        let client = Arc::new(mock.set_ret("campaign:1", Err(CustomRedisError::Timeout)));
        let cache = ReadThroughCache::new(client.clone());

        let result = cache
            .get_with_fallback("campaign:1", 60, || async {
                Ok::<Option<TestData>, String>(Some(test_data()))
            })
            .await
            .unwrap();

        // Producer value is returned even though the store write failed.
        assert_eq!(result.value, Some(test_data()));
        assert_eq!(result.source, CacheSource::LoaderCacheMiss);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let client = Arc::new(MockRedisClient::new());
        let cache = ReadThroughCache::new(client.clone());
        let invocations = AtomicUsize::new(0);

        let produce = || async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<Option<TestData>, String>(Some(test_data()))
        };

        cache
            .get_with_fallback("campaign:1", 1, produce)
            .await
            .unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let result = cache
            .get_with_fallback("campaign:1", 1, || async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<Option<TestData>, String>(Some(test_data()))
            })
            .await
            .unwrap();
        assert_eq!(result.source, CacheSource::LoaderCacheMiss);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }
}
