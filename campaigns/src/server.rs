use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common_database::{get_pool, PostgresReader, PostgresWriter};
use common_redis::RedisClient;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::router;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let redis_client = match RedisClient::with_timeouts(
        config.redis_url.clone(),
        Some(Duration::from_millis(500)),
        Some(Duration::from_secs(5)),
    )
    .await
    {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(
                "Failed to create Redis client for URL {}: {}",
                config.redis_url,
                e
            );
            return;
        }
    };

    let reader: PostgresReader = match get_pool(
        &config.read_database_url,
        config.max_pg_connections,
    )
    .await
    {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            tracing::error!("Failed to create read postgres pool: {}", e);
            return;
        }
    };

    let writer: PostgresWriter = match get_pool(
        &config.write_database_url,
        config.max_pg_connections,
    )
    .await
    {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            tracing::error!("Failed to create write postgres pool: {}", e);
            return;
        }
    };

    let app = router::router(redis_client, reader, writer, config);

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap()
}
