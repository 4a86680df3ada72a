use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

use crate::{Client, CustomRedisError};

// SCAN page size for del_matching. Large enough to keep round trips down,
// small enough not to block the server on a single call.
const SCAN_COUNT: usize = 100;

pub struct RedisClient {
    connection: MultiplexedConnection,
}

impl RedisClient {
    /// Create a new RedisClient with no command or connection timeouts
    /// (blocks indefinitely).
    pub async fn new(addr: String) -> Result<RedisClient, CustomRedisError> {
        Self::with_timeouts(addr, None, None).await
    }

    /// Create a new RedisClient with explicit timeouts.
    ///
    /// # Arguments
    /// * `addr` - Redis connection string
    /// * `response_timeout` - Optional timeout for command responses. `None` means no timeout.
    /// * `connection_timeout` - Optional timeout for establishing connections. `None` means no timeout.
    ///
    /// # Errors
    /// Returns `CustomRedisError::InvalidConfiguration` if `Some(Duration::ZERO)`
    /// is passed - use `None` for no timeout instead.
    pub async fn with_timeouts(
        addr: String,
        response_timeout: Option<Duration>,
        connection_timeout: Option<Duration>,
    ) -> Result<RedisClient, CustomRedisError> {
        let client = redis::Client::open(addr)?;

        if let Some(timeout) = response_timeout {
            if timeout.is_zero() {
                return Err(CustomRedisError::InvalidConfiguration(
                    "Redis response timeout cannot be Duration::ZERO - use None for no timeout"
                        .to_string(),
                ));
            }
        }
        if let Some(timeout) = connection_timeout {
            if timeout.is_zero() {
                return Err(CustomRedisError::InvalidConfiguration(
                    "Redis connection timeout cannot be Duration::ZERO - use None for no timeout"
                        .to_string(),
                ));
            }
        }

        // Use Redis native timeout configuration.
        // None means no timeout (blocks indefinitely).
        let mut config = redis::AsyncConnectionConfig::new();

        if let Some(timeout) = response_timeout {
            config = config.set_response_timeout(timeout);
        }

        if let Some(timeout) = connection_timeout {
            config = config.set_connection_timeout(timeout);
        }

        let connection = client
            .get_multiplexed_async_connection_with_config(&config)
            .await?;

        Ok(RedisClient { connection })
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        let mut conn = self.connection.clone();
        let raw_bytes: Vec<u8> = conn.get(k).await?;

        // return NotFound error when empty
        if raw_bytes.is_empty() {
            return Err(CustomRedisError::NotFound);
        }

        let value = String::from_utf8(raw_bytes)?;
        Ok(value)
    }

    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(k, v).await?;
        Ok(())
    }

    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(k, v, seconds).await?;
        Ok(())
    }

    async fn del(&self, k: String) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(k).await?;
        Ok(())
    }

    async fn del_matching(&self, pattern: String) -> Result<u64, CustomRedisError> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        // Cursor-based SCAN so the sweep never blocks the server the way
        // KEYS would on a large keyspace. Each page is deleted before the
        // next is fetched.
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                deleted += keys.len() as u64;
                conn.del::<_, ()>(keys).await?;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_response_timeout_returns_error() {
        let result = RedisClient::with_timeouts(
            "redis://localhost:6379".to_string(),
            Some(Duration::ZERO),
            None,
        )
        .await;

        assert!(matches!(
            result,
            Err(CustomRedisError::InvalidConfiguration(_))
        ));
        if let Err(CustomRedisError::InvalidConfiguration(msg)) = result {
            assert!(msg.contains("response timeout"));
        }
    }

    #[tokio::test]
    async fn test_zero_connection_timeout_returns_error() {
        let result = RedisClient::with_timeouts(
            "redis://localhost:6379".to_string(),
            None,
            Some(Duration::ZERO),
        )
        .await;

        assert!(matches!(
            result,
            Err(CustomRedisError::InvalidConfiguration(_))
        ));
        if let Err(CustomRedisError::InvalidConfiguration(msg)) = result {
            assert!(msg.contains("connection timeout"));
        }
    }
}
