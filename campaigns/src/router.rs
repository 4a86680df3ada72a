use std::sync::Arc;

use axum::{
    http::{Method, StatusCode},
    routing::{get, post},
    Router,
};
use common_cache::ReadThroughCache;
use common_database::{PostgresReader, PostgresWriter};
use common_redis::{Client as RedisClient, CustomRedisError};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{api::endpoint, config::Config};

#[derive(Clone)]
pub struct State {
    pub redis_client: Arc<dyn RedisClient + Send + Sync>,
    pub reader: PostgresReader,
    pub writer: PostgresWriter,
    pub cache: Arc<ReadThroughCache>,
    pub config: Config,
}

pub fn router(
    redis_client: Arc<dyn RedisClient + Send + Sync>,
    reader: PostgresReader,
    writer: PostgresWriter,
    config: Config,
) -> Router {
    let cache = Arc::new(ReadThroughCache::new(redis_client.clone()));

    let state = State {
        redis_client,
        reader,
        writer,
        cache,
        config: config.clone(),
    };

    // Permissive CORS: the web client is served from a different origin and
    // proxies might rewrite headers.
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    // liveness/readiness checks
    let status_router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(readiness))
        .route("/_liveness", get(|| async { "ok" }));

    let api_router = Router::new()
        .route("/campaigns", post(endpoint::create_campaign))
        .route("/campaigns/search", get(endpoint::search))
        .route("/campaigns/nearby", get(endpoint::nearby))
        .route("/campaigns/nearest", get(endpoint::nearest))
        .route("/campaigns/within", get(endpoint::within_bounds))
        .route("/campaigns/mine", get(endpoint::my_campaigns))
        .route(
            "/campaigns/:id",
            get(endpoint::get_campaign)
                .patch(endpoint::update_campaign)
                .delete(endpoint::delete_campaign),
        )
        .route("/campaigns/:id/vote", post(endpoint::vote))
        .route("/cities/:city/stats", get(endpoint::city_stats))
        .layer(ConcurrencyLimitLayer::new(config.max_concurrency));

    Router::new()
        .merge(status_router)
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn readiness(
    axum::extract::State(state): axum::extract::State<State>,
) -> Result<&'static str, (StatusCode, String)> {
    let mut conn = state.reader.get_connection().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("reader pool unavailable: {e}"),
        )
    })?;
    sqlx::query("SELECT 1")
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("reader connection test failed: {e}"),
            )
        })?;

    // NotFound just means the probe key isn't set; any other error means the
    // cache store is down. Readiness doesn't gate on it - the cache layer
    // fails open - but surfacing it here aids debugging.
    match state.redis_client.get("_readiness_probe".to_string()).await {
        Ok(_) | Err(CustomRedisError::NotFound) => {}
        Err(e) => {
            tracing::warn!("redis unavailable during readiness check: {e:?}");
        }
    }

    Ok("ready")
}

pub async fn index() -> &'static str {
    "campaigns"
}
