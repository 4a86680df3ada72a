//! Write-triggered cache invalidation.
//!
//! Every mutation clears the exact keys it provably affects, plus broad
//! `search:`/`geo:` prefix sweeps where precise targeting would require
//! dependency tracking (a new or edited campaign can surface in any search
//! or geo result set). The sweep-over-tracking choice trades hit rate for
//! correctness simplicity.
//!
//! Invalidation runs strictly after the database write commits - running it
//! before would let a concurrent read repopulate the cache with pre-write
//! rows. If the cache store is unreachable, the failure is logged and
//! swallowed: the source-of-truth write already succeeded, and TTL expiry
//! bounds the resulting staleness.

use metrics::counter;
use std::sync::Arc;
use uuid::Uuid;

use common_redis::Client as RedisClient;

use crate::cache::keys;

const INVALIDATION_FAILURES_COUNTER: &str = "campaign_cache_invalidation_failures_total";
const INVALIDATION_KEYS_DELETED_COUNTER: &str = "campaign_cache_invalidation_keys_deleted_total";

/// Which keys a committed write must clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationScope {
    /// A single exact key (`campaign:{id}`).
    Exact(String),
    /// Every key under a namespace prefix (`search:`, `geo:`, `user:{id}:`).
    Prefix(String),
}

impl InvalidationScope {
    fn describe(&self) -> String {
        match self {
            InvalidationScope::Exact(key) => format!("key {key}"),
            InvalidationScope::Prefix(prefix) => format!("prefix {prefix}*"),
        }
    }
}

/// A new campaign can appear in any search or geo result set, and in its
/// creator's own list.
pub fn on_campaign_created(creator_id: Uuid) -> Vec<InvalidationScope> {
    vec![
        InvalidationScope::Prefix(keys::SEARCH_KEY_PREFIX.to_string()),
        InvalidationScope::Prefix(keys::GEO_KEY_PREFIX.to_string()),
        InvalidationScope::Prefix(keys::user_prefix(creator_id)),
    ]
}

/// Updates may change status, location or text, any of which moves the
/// campaign across search/geo result sets - conservatively treated as
/// always-possible rather than diffing the patch.
pub fn on_campaign_updated(id: Uuid) -> Vec<InvalidationScope> {
    vec![
        InvalidationScope::Exact(keys::campaign_key(id)),
        InvalidationScope::Prefix(keys::SEARCH_KEY_PREFIX.to_string()),
        InvalidationScope::Prefix(keys::GEO_KEY_PREFIX.to_string()),
    ]
}

pub fn on_campaign_deleted(id: Uuid, creator_id: Uuid) -> Vec<InvalidationScope> {
    vec![
        InvalidationScope::Exact(keys::campaign_key(id)),
        InvalidationScope::Prefix(keys::SEARCH_KEY_PREFIX.to_string()),
        InvalidationScope::Prefix(keys::GEO_KEY_PREFIX.to_string()),
        InvalidationScope::Prefix(keys::user_prefix(creator_id)),
    ]
}

/// Votes only move counters: the cached detail view embeds them, and the
/// voter's own list shows them. Search/geo result membership is unaffected,
/// so no sweep.
pub fn on_vote_cast(campaign_id: Uuid, voter_id: Uuid) -> Vec<InvalidationScope> {
    vec![
        InvalidationScope::Exact(keys::campaign_key(campaign_id)),
        InvalidationScope::Prefix(keys::user_prefix(voter_id)),
    ]
}

/// Apply the scopes against the cache store. Must be called only after the
/// underlying write has committed. Never fails the request: per-scope
/// errors are logged at warn and counted.
pub async fn invalidate(
    redis_client: &Arc<dyn RedisClient + Send + Sync>,
    scopes: &[InvalidationScope],
) {
    for scope in scopes {
        let result = match scope {
            InvalidationScope::Exact(key) => {
                redis_client.del(key.clone()).await.map(|_| 1u64)
            }
            InvalidationScope::Prefix(prefix) => {
                redis_client.del_matching(format!("{prefix}*")).await
            }
        };

        match result {
            Ok(deleted) => {
                counter!(INVALIDATION_KEYS_DELETED_COUNTER).increment(deleted);
                tracing::debug!("invalidated {} ({} keys)", scope.describe(), deleted);
            }
            Err(err) => {
                counter!(INVALIDATION_FAILURES_COUNTER).increment(1);
                tracing::warn!(
                    "cache invalidation failed for {}: {:?}. stale entries expire at TTL",
                    scope.describe(),
                    err
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_redis::{Client, CustomRedisError, MockRedisClient};

    fn seeded_client() -> (Arc<dyn Client + Send + Sync>, MockRedisClient) {
        let mock = MockRedisClient::new();
        let client: Arc<dyn Client + Send + Sync> = Arc::new(mock.clone());
        (client, mock)
    }

    async fn seed(client: &Arc<dyn Client + Send + Sync>, keys: &[&str]) {
        for key in keys {
            client
                .setex(key.to_string(), "{}".to_string(), 300)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_sweeps_search_geo_and_creator() {
        let (client, mock) = seeded_client();
        let creator = Uuid::new_v4();
        seed(
            &client,
            &[
                "search:bike lane",
                "search:parks:status=ACTIVE",
                "geo:radius:37.77:-122.42:5000",
                "geo:city:springfield",
                &format!("user:{creator}:campaigns"),
                "campaign:unrelated",
            ],
        )
        .await;

        invalidate(&client, &on_campaign_created(creator)).await;

        // the whole search/geo namespaces are gone, not just one key
        assert!(mock
            .stored_keys()
            .iter()
            .all(|k| !k.starts_with("search:") && !k.starts_with("geo:")));
        assert!(!mock.contains_key(&format!("user:{creator}:campaigns")));
        // unrelated entity keys survive
        assert!(mock.contains_key("campaign:unrelated"));
    }

    #[tokio::test]
    async fn test_update_clears_exact_key_and_sweeps() {
        let (client, mock) = seeded_client();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        seed(
            &client,
            &[
                &keys::campaign_key(id),
                &keys::campaign_key(other),
                "search:bike lane",
                "geo:nearest:37.775:-122.419:limit=5",
            ],
        )
        .await;

        invalidate(&client, &on_campaign_updated(id)).await;

        assert!(!mock.contains_key(&keys::campaign_key(id)));
        assert!(!mock.contains_key("search:bike lane"));
        assert!(!mock.contains_key("geo:nearest:37.775:-122.419:limit=5"));
        // other campaigns' detail caches are untouched
        assert!(mock.contains_key(&keys::campaign_key(other)));
    }

    #[tokio::test]
    async fn test_vote_clears_detail_and_voter_keys_only() {
        let (client, mock) = seeded_client();
        let campaign_id = Uuid::new_v4();
        let voter = Uuid::new_v4();
        let bystander = Uuid::new_v4();
        seed(
            &client,
            &[
                &keys::campaign_key(campaign_id),
                &format!("user:{voter}:campaigns"),
                &format!("user:{voter}:campaigns:status=ACTIVE"),
                &format!("user:{bystander}:campaigns"),
                "search:bike lane",
            ],
        )
        .await;

        invalidate(&client, &on_vote_cast(campaign_id, voter)).await;

        assert!(!mock.contains_key(&keys::campaign_key(campaign_id)));
        assert!(!mock.contains_key(&format!("user:{voter}:campaigns")));
        assert!(!mock.contains_key(&format!("user:{voter}:campaigns:status=ACTIVE")));
        // votes don't change search membership, so no sweep
        assert!(mock.contains_key("search:bike lane"));
        assert!(mock.contains_key(&format!("user:{bystander}:campaigns")));
    }

    #[tokio::test]
    async fn test_invalidation_failure_is_swallowed() {
        let mut mock = MockRedisClient::new();
        let mock = mock.del_matching_ret(Err(CustomRedisError::Timeout));
        let client: Arc<dyn Client + Send + Sync> = Arc::new(mock.clone());

        // must not panic or propagate - the write already committed
        invalidate(&client, &on_campaign_created(Uuid::new_v4())).await;

        assert_eq!(mock.call_count("del_matching"), 3);
    }
}
