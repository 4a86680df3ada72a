use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::{Client, CustomRedisError};

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

/// In-memory stand-in for the real Redis client.
///
/// Behaves as a live keyspace: `set`/`setex` store, `get` honors expiries
/// lazily, `del`/`del_matching` remove. Individual operations can be forced
/// to return a fixed result (usually an error) per key via the `*_ret`
/// builders, and every call is recorded for assertion via `get_calls`.
#[derive(Clone, Default)]
pub struct MockRedisClient {
    store: Arc<Mutex<HashMap<String, StoredEntry>>>,
    get_ret: HashMap<String, Result<String, CustomRedisError>>,
    set_ret: HashMap<String, Result<(), CustomRedisError>>,
    del_ret: HashMap<String, Result<(), CustomRedisError>>,
    del_matching_ret: Option<Result<u64, CustomRedisError>>,
    calls: Arc<Mutex<Vec<MockRedisCall>>>,
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    // Helper method to safely lock a mutex shared across clones
    fn lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Force `get` for `key` to return `ret` instead of consulting the store.
    pub fn get_ret(&mut self, key: &str, ret: Result<String, CustomRedisError>) -> Self {
        self.get_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    /// Force `set`/`setex` for `key` to return `ret` without storing.
    pub fn set_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.set_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    /// Force `del` for `key` to return `ret` without deleting.
    pub fn del_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.del_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    /// Force every `del_matching` call to return `ret` without deleting.
    pub fn del_matching_ret(&mut self, ret: Result<u64, CustomRedisError>) -> Self {
        self.del_matching_ret = Some(ret);
        self.clone()
    }

    pub fn get_calls(&self) -> Vec<MockRedisCall> {
        Self::lock(&self.calls).clone()
    }

    /// Number of times `op` was invoked, across all keys.
    pub fn call_count(&self, op: &str) -> usize {
        Self::lock(&self.calls).iter().filter(|c| c.op == op).count()
    }

    /// Whether a live (non-expired) entry exists for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        Self::lock(&self.store)
            .get(key)
            .map(|e| !e.is_expired())
            .unwrap_or(false)
    }

    /// All live keys, unordered.
    pub fn stored_keys(&self) -> Vec<String> {
        Self::lock(&self.store)
            .iter()
            .filter(|(_, e)| !e.is_expired())
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum MockRedisValue {
    None,
    String(String),
    StringWithTTL(String, u64),
}

#[derive(Debug, Clone)]
pub struct MockRedisCall {
    pub op: String,
    pub key: String,
    pub value: MockRedisValue,
}

// '*' matches any run of characters; no other metacharacters are supported.
// Matches the subset of redis glob syntax the invalidation sweeps use.
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }
    if !key.starts_with(parts[0]) {
        return false;
    }
    let mut pos = parts[0].len();
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match key[pos..].find(part) {
            Some(i) => pos += i + part.len(),
            None => return false,
        }
    }
    let last = parts[parts.len() - 1];
    last.is_empty() || key[pos..].ends_with(last)
}

#[async_trait]
impl Client for MockRedisClient {
    async fn get(&self, key: String) -> Result<String, CustomRedisError> {
        Self::lock(&self.calls).push(MockRedisCall {
            op: "get".to_string(),
            key: key.clone(),
            value: MockRedisValue::None,
        });

        if let Some(forced) = self.get_ret.get(&key) {
            return forced.clone();
        }

        let mut store = Self::lock(&self.store);
        match store.get(&key) {
            Some(entry) if entry.is_expired() => {
                store.remove(&key);
                Err(CustomRedisError::NotFound)
            }
            Some(entry) => Ok(entry.value.clone()),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn set(&self, key: String, value: String) -> Result<(), CustomRedisError> {
        Self::lock(&self.calls).push(MockRedisCall {
            op: "set".to_string(),
            key: key.clone(),
            value: MockRedisValue::String(value.clone()),
        });

        if let Some(forced) = self.set_ret.get(&key) {
            return forced.clone();
        }

        Self::lock(&self.store).insert(
            key,
            StoredEntry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn setex(&self, key: String, value: String, seconds: u64) -> Result<(), CustomRedisError> {
        Self::lock(&self.calls).push(MockRedisCall {
            op: "setex".to_string(),
            key: key.clone(),
            value: MockRedisValue::StringWithTTL(value.clone(), seconds),
        });

        if let Some(forced) = self.set_ret.get(&key) {
            return forced.clone();
        }

        Self::lock(&self.store).insert(
            key,
            StoredEntry {
                value,
                expires_at: Some(Instant::now() + Duration::from_secs(seconds)),
            },
        );
        Ok(())
    }

    async fn del(&self, key: String) -> Result<(), CustomRedisError> {
        Self::lock(&self.calls).push(MockRedisCall {
            op: "del".to_string(),
            key: key.clone(),
            value: MockRedisValue::None,
        });

        if let Some(forced) = self.del_ret.get(&key) {
            return forced.clone();
        }

        Self::lock(&self.store).remove(&key);
        Ok(())
    }

    async fn del_matching(&self, pattern: String) -> Result<u64, CustomRedisError> {
        Self::lock(&self.calls).push(MockRedisCall {
            op: "del_matching".to_string(),
            key: pattern.clone(),
            value: MockRedisValue::None,
        });

        if let Some(forced) = &self.del_matching_ret {
            return forced.clone();
        }

        let mut store = Self::lock(&self.store);
        let matching: Vec<String> = store
            .keys()
            .filter(|k| glob_match(&pattern, k))
            .cloned()
            .collect();
        for key in &matching {
            store.remove(key);
        }
        Ok(matching.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("search:*", "search:bike lane"));
        assert!(glob_match("search:*", "search:"));
        assert!(!glob_match("search:*", "geo:radius:37.77"));
        assert!(glob_match("user:42:*", "user:42:campaigns"));
        assert!(!glob_match("user:42:*", "user:421:campaigns"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exact:more"));
    }

    #[tokio::test]
    async fn test_store_roundtrip_and_del() {
        let client = MockRedisClient::new();
        client
            .set("k1".to_string(), "v1".to_string())
            .await
            .unwrap();
        assert_eq!(client.get("k1".to_string()).await.unwrap(), "v1");

        client.del("k1".to_string()).await.unwrap();
        assert!(matches!(
            client.get("k1".to_string()).await,
            Err(CustomRedisError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_setex_expires() {
        let client = MockRedisClient::new();
        client
            .setex("short".to_string(), "v".to_string(), 1)
            .await
            .unwrap();
        assert!(client.contains_key("short"));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(matches!(
            client.get("short".to_string()).await,
            Err(CustomRedisError::NotFound)
        ));
        assert!(!client.contains_key("short"));
    }

    #[tokio::test]
    async fn test_del_matching_removes_only_matches() {
        let client = MockRedisClient::new();
        for key in ["search:a", "search:b", "geo:radius:1", "campaign:x"] {
            client
                .set(key.to_string(), "v".to_string())
                .await
                .unwrap();
        }

        let deleted = client.del_matching("search:*".to_string()).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(!client.contains_key("search:a"));
        assert!(!client.contains_key("search:b"));
        assert!(client.contains_key("geo:radius:1"));
        assert!(client.contains_key("campaign:x"));
    }

    #[tokio::test]
    async fn test_forced_get_error_wins_over_store() {
        let mut client = MockRedisClient::new();
        let client = client.get_ret("k", Err(CustomRedisError::Timeout));
        client.set("k".to_string(), "v".to_string()).await.unwrap();

        assert!(matches!(
            client.get("k".to_string()).await,
            Err(CustomRedisError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_calls_are_recorded_across_clones() {
        let client = MockRedisClient::new();
        let clone = client.clone();
        clone.set("k".to_string(), "v".to_string()).await.unwrap();
        clone.get("k".to_string()).await.unwrap();

        assert_eq!(client.call_count("set"), 1);
        assert_eq!(client.call_count("get"), 1);
    }
}
