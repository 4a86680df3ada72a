use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{
    pool::PoolConnection,
    postgres::{PgPool, PgPoolOptions},
    Error as SqlxError, Postgres,
};
use thiserror::Error;

// Default database timeouts. Statement timeout leaves room for the geo
// queries (haversine over a city's worth of rows); lock timeout stays tight
// so writes never queue behind long transactions.
pub const DEFAULT_TIMEOUTS: DatabaseTimeouts = DatabaseTimeouts {
    statement_timeout: Duration::from_millis(2000),
    lock_timeout: Duration::from_millis(500),
    acquire_timeout: Duration::from_millis(1000),
    idle_timeout: Duration::from_secs(300),
    max_lifetime: Duration::from_secs(1800),
    idle_in_transaction_session_timeout: Duration::from_secs(15),
};

#[derive(Error, Debug)]
pub enum CustomDatabaseError {
    #[error("Pg error: {0}")]
    Other(#[from] sqlx::Error),

    #[error("Client timeout error")]
    Timeout(#[from] tokio::time::error::Elapsed),
}

pub type PostgresReader = Arc<dyn Client + Send + Sync>;
pub type PostgresWriter = Arc<dyn Client + Send + Sync>;

/// A simple db wrapper
///
/// ## Timeout Strategy
/// - Session defaults set statement/lock timeouts on every connection
/// - Pool acquire timeout fails fast under load instead of queueing
#[async_trait]
pub trait Client {
    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError>;
}

#[derive(Debug, Clone)]
pub struct DatabaseTimeouts {
    pub statement_timeout: Duration,
    pub lock_timeout: Duration,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub idle_in_transaction_session_timeout: Duration,
}

pub async fn get_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    get_pool_with_timeouts(url, max_connections, DEFAULT_TIMEOUTS).await
}

pub async fn get_pool_with_timeouts(
    url: &str,
    max_connections: u32,
    timeouts: DatabaseTimeouts,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(timeouts.acquire_timeout)
        .test_before_acquire(true)
        .idle_timeout(timeouts.idle_timeout)
        .max_lifetime(timeouts.max_lifetime)
        // Set PostgreSQL session-level timeouts for all queries on this connection
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                let stmt_ms: i64 = timeouts
                    .statement_timeout
                    .as_millis()
                    .try_into()
                    .expect("statement_timeout too large");
                let lock_ms: i64 = timeouts
                    .lock_timeout
                    .as_millis()
                    .try_into()
                    .expect("lock_timeout too large");

                // PostgreSQL SET commands don't accept bind parameters
                sqlx::query(&format!("SET statement_timeout = '{stmt_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;

                sqlx::query(&format!("SET lock_timeout = '{lock_ms}ms'"))
                    .execute(&mut *conn)
                    .await?;

                // Safety net: kill idle transactions so leaked transactions
                // can't hold locks forever
                let idle_tx_secs: i64 = timeouts
                    .idle_in_transaction_session_timeout
                    .as_secs()
                    .try_into()
                    .expect("idle_in_transaction_session_timeout too large");
                sqlx::query(&format!(
                    "SET idle_in_transaction_session_timeout = '{idle_tx_secs}s'"
                ))
                .execute(&mut *conn)
                .await?;

                Ok(())
            })
        })
        .connect(url)
        .await
}

#[async_trait]
impl Client for PgPool {
    async fn get_connection(&self) -> Result<PoolConnection<Postgres>, CustomDatabaseError> {
        let conn = self.acquire().await?;
        Ok(conn)
    }
}

/// Determines if a sqlx::Error represents a timeout-related failure
pub fn is_timeout_error(error: &SqlxError) -> bool {
    match error {
        // Pool acquisition timed out
        SqlxError::PoolTimedOut => true,

        // IO-level timeout (network/socket)
        SqlxError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => true,

        // Protocol text sometimes includes "timeout"
        SqlxError::Protocol(msg) => msg.to_lowercase().contains("timeout"),

        // Database-reported timeouts/cancels
        SqlxError::Database(db_error) => {
            if let Some(code) = db_error.code() {
                let code = code.as_ref();
                // 57014: query_canceled (e.g., statement_timeout)
                // 55P03: lock_not_available (e.g., lock_timeout)
                // 25P03: idle_in_transaction_session_timeout
                code == "57014" || code == "55P03" || code == "25P03"
            } else {
                // Fallback heuristic (less reliable than SQLSTATE)
                let msg = db_error.message().to_lowercase();
                msg.contains("timeout") || msg.contains("canceling")
            }
        }

        _ => false,
    }
}
