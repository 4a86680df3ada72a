//! Campaign API handlers.
//!
//! Reads follow one shape: validate, derive the cache key, go through the
//! read-through accessor with the query-class TTL, map the produced rows to
//! response types. Writes persist first and invalidate after the commit;
//! invalidation is never allowed to fail the request.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use crate::api::errors::{CampaignError, ClientFacingError};
use crate::api::types::{
    CampaignListResponse, CampaignResponse, CityStatsResponse, CreateCampaignRequest,
    MineQueryParams, NearbyQueryParams, NearestQueryParams, SearchQueryParams,
    UpdateCampaignRequest, VoteRequest, WithinQueryParams,
};
use crate::cache::{invalidation, keys, policy};
use crate::campaigns::campaign_models::{Campaign, CampaignWithDistance};
use crate::campaigns::campaign_operations;
use crate::router;

pub const DEFAULT_RADIUS_METERS: f64 = 5_000.0;
pub const DEFAULT_NEAREST_LIMIT: i64 = 10;

fn acting_user(headers: &HeaderMap) -> Result<Uuid, CampaignError> {
    let raw = headers
        .get("X-User-Id")
        .ok_or(CampaignError::MissingUserId)?
        .to_str()
        .map_err(|_| CampaignError::MissingUserId)?;
    Uuid::parse_str(raw)
        .map_err(|_| ClientFacingError::BadRequest("invalid X-User-Id header".to_string()).into())
}

fn list_response(campaigns: Vec<Campaign>, limit: Option<i64>) -> CampaignListResponse {
    let page_full =
        campaigns.len() as i64 >= limit.unwrap_or(campaign_operations::DEFAULT_QUERY_LIMIT);
    let next_cursor = if page_full {
        campaigns.last().map(|c| c.id)
    } else {
        None
    };
    CampaignListResponse {
        results: campaigns.into_iter().map(Into::into).collect(),
        next_cursor,
    }
}

fn geo_list_response(rows: Vec<CampaignWithDistance>) -> CampaignListResponse {
    CampaignListResponse {
        results: rows.into_iter().map(Into::into).collect(),
        next_cursor: None,
    }
}

pub async fn create_campaign(
    State(state): State<router::State>,
    headers: HeaderMap,
    Json(request): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CampaignResponse>), CampaignError> {
    let user_id = acting_user(&headers)?;
    request.validate()?;

    let campaign = campaign_operations::create_campaign(
        state.writer.clone(),
        user_id,
        &request.to_new_campaign(),
    )
    .await?;

    // Strictly after the insert committed: a new campaign can show up in any
    // search/geo result set, so those namespaces are swept wholesale.
    invalidation::invalidate(
        &state.redis_client,
        &invalidation::on_campaign_created(user_id),
    )
    .await;

    Ok((StatusCode::CREATED, Json(campaign.into())))
}

pub async fn get_campaign(
    State(state): State<router::State>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, CampaignError> {
    let key = keys::campaign_key(id);
    let reader = state.reader.clone();

    let result = state
        .cache
        .get_with_fallback(&key, policy::CAMPAIGN_DETAIL_TTL_SECONDS, || async move {
            campaign_operations::get_campaign(reader, id).await
        })
        .await?;

    match result.value {
        Some(campaign) => Ok(Json(campaign.into())),
        None => Err(CampaignError::CampaignNotFound),
    }
}

pub async fn search(
    State(state): State<router::State>,
    Query(params): Query<SearchQueryParams>,
) -> Result<Json<CampaignListResponse>, CampaignError> {
    params.validate()?;

    let query = keys::normalize_query(&params.q);
    let filters = params.filters();
    let key = keys::search_key(&query, &filters);

    let reader = state.reader.clone();
    let producer_query = query.clone();
    let producer_filters = filters.clone();
    let result = state
        .cache
        .get_with_fallback(&key, policy::SEARCH_TTL_SECONDS, || async move {
            campaign_operations::search_campaigns(reader, &producer_query, &producer_filters)
                .await
                .map(Some)
        })
        .await?;

    Ok(Json(list_response(
        result.value.unwrap_or_default(),
        filters.limit,
    )))
}

pub async fn nearby(
    State(state): State<router::State>,
    Query(params): Query<NearbyQueryParams>,
) -> Result<Json<CampaignListResponse>, CampaignError> {
    params.validate()?;

    let radius_meters = params.radius_meters.unwrap_or(DEFAULT_RADIUS_METERS);
    let tier = policy::tier_for_radius(radius_meters);
    let filters = params.filters();
    let key = keys::geo_radius_key(params.lat, params.lon, radius_meters, tier, &filters);

    let reader = state.reader.clone();
    let producer_filters = filters.clone();
    let result = state
        .cache
        .get_with_fallback(&key, policy::GEO_TTL_SECONDS, || async move {
            campaign_operations::find_within_radius(
                reader,
                params.lat,
                params.lon,
                radius_meters,
                &producer_filters,
            )
            .await
            .map(Some)
        })
        .await?;

    Ok(Json(geo_list_response(result.value.unwrap_or_default())))
}

pub async fn nearest(
    State(state): State<router::State>,
    Query(params): Query<NearestQueryParams>,
) -> Result<Json<CampaignListResponse>, CampaignError> {
    params.validate()?;

    let n = params.limit.unwrap_or(DEFAULT_NEAREST_LIMIT);
    // Nearest-N callers expect street-level sensitivity, so the finest tier.
    let tier = policy::PrecisionTier::NeighborhoodLevel;
    let key = keys::geo_nearest_key(params.lat, params.lon, n, tier);

    let reader = state.reader.clone();
    let result = state
        .cache
        .get_with_fallback(&key, policy::GEO_TTL_SECONDS, || async move {
            campaign_operations::find_nearest(reader, params.lat, params.lon, n)
                .await
                .map(Some)
        })
        .await?;

    Ok(Json(geo_list_response(result.value.unwrap_or_default())))
}

pub async fn within_bounds(
    State(state): State<router::State>,
    Query(params): Query<WithinQueryParams>,
) -> Result<Json<CampaignListResponse>, CampaignError> {
    params.validate()?;

    // Bounding boxes come from map viewports, which are kilometre-scale.
    let tier = policy::PrecisionTier::CityLevel;
    let filters = params.filters();
    let key = keys::geo_bounds_key(
        params.min_lat,
        params.min_lon,
        params.max_lat,
        params.max_lon,
        tier,
        &filters,
    );

    let reader = state.reader.clone();
    let producer_filters = filters.clone();
    let result = state
        .cache
        .get_with_fallback(&key, policy::GEO_TTL_SECONDS, || async move {
            campaign_operations::find_in_bounds(
                reader,
                params.min_lat,
                params.min_lon,
                params.max_lat,
                params.max_lon,
                &producer_filters,
            )
            .await
            .map(Some)
        })
        .await?;

    // Bounding-box results are viewport-shaped, not paginated.
    Ok(Json(CampaignListResponse {
        results: result
            .value
            .unwrap_or_default()
            .into_iter()
            .map(Into::into)
            .collect(),
        next_cursor: None,
    }))
}

pub async fn my_campaigns(
    State(state): State<router::State>,
    headers: HeaderMap,
    Query(params): Query<MineQueryParams>,
) -> Result<Json<CampaignListResponse>, CampaignError> {
    let user_id = acting_user(&headers)?;
    params.validate()?;

    let filters = params.filters();
    let key = keys::user_campaigns_key(user_id, &filters);

    let reader = state.reader.clone();
    let producer_filters = filters.clone();
    let result = state
        .cache
        .get_with_fallback(&key, policy::USER_CAMPAIGNS_TTL_SECONDS, || async move {
            campaign_operations::user_campaigns(reader, user_id, &producer_filters)
                .await
                .map(Some)
        })
        .await?;

    Ok(Json(list_response(
        result.value.unwrap_or_default(),
        filters.limit,
    )))
}

pub async fn city_stats(
    State(state): State<router::State>,
    Path(city): Path<String>,
) -> Result<Json<CityStatsResponse>, CampaignError> {
    if city.trim().is_empty() {
        return Err(ClientFacingError::BadRequest("city must not be blank".to_string()).into());
    }

    let key = keys::city_stats_key(&city);
    let reader = state.reader.clone();
    let result = state
        .cache
        .get_with_fallback(&key, policy::CITY_STATS_TTL_SECONDS, || async move {
            campaign_operations::city_stats(reader, &city).await
        })
        .await?;

    match result.value {
        Some(stats) => Ok(Json(stats.into())),
        None => Err(CampaignError::CityNotFound),
    }
}

pub async fn update_campaign(
    State(state): State<router::State>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCampaignRequest>,
) -> Result<Json<CampaignResponse>, CampaignError> {
    request.validate()?;

    let updated =
        campaign_operations::update_campaign(state.writer.clone(), id, &request.to_patch())
            .await?
            .ok_or(CampaignError::CampaignNotFound)?;

    invalidation::invalidate(&state.redis_client, &invalidation::on_campaign_updated(id)).await;

    Ok(Json(updated.into()))
}

pub async fn delete_campaign(
    State(state): State<router::State>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, CampaignError> {
    let creator_id = campaign_operations::delete_campaign(state.writer.clone(), id)
        .await?
        .ok_or(CampaignError::CampaignNotFound)?;

    invalidation::invalidate(
        &state.redis_client,
        &invalidation::on_campaign_deleted(id, creator_id),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn vote(
    State(state): State<router::State>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<VoteRequest>,
) -> Result<Json<CampaignResponse>, CampaignError> {
    let user_id = acting_user(&headers)?;

    let updated =
        campaign_operations::cast_vote(state.writer.clone(), id, user_id, request.direction)
            .await?
            .ok_or(CampaignError::CampaignNotFound)?;

    // The cached detail view embeds the counters this vote just changed.
    invalidation::invalidate(
        &state.redis_client,
        &invalidation::on_vote_cast(id, user_id),
    )
    .await;

    Ok(Json(updated.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_acting_user_parses_header() {
        let mut headers = HeaderMap::new();
        let id = Uuid::new_v4();
        headers.insert("X-User-Id", HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(acting_user(&headers).unwrap(), id);
    }

    #[test]
    fn test_acting_user_missing_or_invalid() {
        let headers = HeaderMap::new();
        assert!(matches!(
            acting_user(&headers),
            Err(CampaignError::MissingUserId)
        ));

        let mut headers = HeaderMap::new();
        headers.insert("X-User-Id", HeaderValue::from_static("not-a-uuid"));
        assert!(matches!(
            acting_user(&headers),
            Err(CampaignError::ClientFacing(_))
        ));
    }

    #[test]
    fn test_list_response_cursor_only_on_full_page() {
        use crate::test_utils::test_campaign;

        let full: Vec<Campaign> = (0..2)
            .map(|_| test_campaign("Bike Lane on Elm St", "Springfield"))
            .collect();
        let last_id = full.last().unwrap().id;
        let response = list_response(full, Some(2));
        assert_eq!(response.next_cursor, Some(last_id));

        let partial = vec![test_campaign("Bike Lane on Elm St", "Springfield")];
        let response = list_response(partial, Some(2));
        assert_eq!(response.next_cursor, None);
    }
}
