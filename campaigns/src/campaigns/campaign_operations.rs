use chrono::{DateTime, Utc};
use common_database::{PostgresReader, PostgresWriter};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::api::errors::CampaignError;
use crate::campaigns::campaign_models::{
    Campaign, CampaignFilters, CampaignPatch, CampaignWithDistance, CityStats, NewCampaign,
    VoteDirection,
};

/// SQL fragment for selecting all Campaign columns
const CAMPAIGN_COLUMNS: &str = "
    id,
    creator_id,
    title,
    description,
    status,
    latitude,
    longitude,
    address,
    city,
    state,
    support_count,
    oppose_count,
    created_at,
    updated_at
";

// Result-set bound applied when the caller supplies no limit filter. The
// default is a producer concern, not a key concern: an absent limit stays
// absent in the derived cache key.
pub const DEFAULT_QUERY_LIMIT: i64 = 20;

/// Appends the great-circle distance (meters) from (`lat`, `lon`) to each
/// row's coordinates. Haversine over a spherical earth; the couple of meters
/// of error against a true ellipsoid doesn't matter at city scale.
fn push_distance_expr(qb: &mut QueryBuilder<'_, Postgres>, lat: f64, lon: f64) {
    qb.push("6371000.0 * 2.0 * asin(sqrt(pow(sin(radians(latitude - ");
    qb.push_bind(lat);
    qb.push(") / 2.0), 2) + cos(radians(");
    qb.push_bind(lat);
    qb.push(")) * cos(radians(latitude)) * pow(sin(radians(longitude - ");
    qb.push_bind(lon);
    qb.push(") / 2.0), 2)))");
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &CampaignFilters) {
    if let Some(status) = filters.status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    }
    if let Some(city) = &filters.city {
        qb.push(" AND lower(city) = lower(");
        qb.push_bind(city.clone());
        qb.push(")");
    }
    if let Some(state) = &filters.state {
        qb.push(" AND lower(state) = lower(");
        qb.push_bind(state.clone());
        qb.push(")");
    }
}

pub async fn get_campaign(
    client: PostgresReader,
    id: Uuid,
) -> Result<Option<Campaign>, CampaignError> {
    let mut conn = client.get_connection().await?;

    let query = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1");
    let row = sqlx::query_as::<_, Campaign>(&query)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row)
}

/// Free-text search over title and description, newest first,
/// keyset-paginated on (created_at, id).
pub async fn search_campaigns(
    client: PostgresReader,
    query: &str,
    filters: &CampaignFilters,
) -> Result<Vec<Campaign>, CampaignError> {
    let mut conn = client.get_connection().await?;

    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE (title ILIKE "
    ));
    let pattern = format!("%{query}%");
    qb.push_bind(pattern.clone());
    qb.push(" OR description ILIKE ");
    qb.push_bind(pattern);
    qb.push(")");
    push_filters(&mut qb, filters);

    if let Some(cursor) = filters.cursor {
        let cursor_row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT created_at FROM campaigns WHERE id = $1")
                .bind(cursor)
                .fetch_optional(&mut *conn)
                .await?;
        // An unknown cursor id means the cursor row was deleted; restart from
        // the top rather than failing the whole request.
        if let Some((cursor_created_at,)) = cursor_row {
            qb.push(" AND (created_at, id) < (");
            qb.push_bind(cursor_created_at);
            qb.push(", ");
            qb.push_bind(cursor);
            qb.push(")");
        }
    }

    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    qb.push_bind(filters.limit.unwrap_or(DEFAULT_QUERY_LIMIT));

    let rows = qb.build_query_as::<Campaign>().fetch_all(&mut *conn).await?;
    Ok(rows)
}

pub async fn user_campaigns(
    client: PostgresReader,
    user_id: Uuid,
    filters: &CampaignFilters,
) -> Result<Vec<Campaign>, CampaignError> {
    let mut conn = client.get_connection().await?;

    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE creator_id = "
    ));
    qb.push_bind(user_id);
    push_filters(&mut qb, filters);
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    qb.push_bind(filters.limit.unwrap_or(DEFAULT_QUERY_LIMIT));

    let rows = qb.build_query_as::<Campaign>().fetch_all(&mut *conn).await?;
    Ok(rows)
}

/// Campaigns within `radius_meters` of the center, closest first.
pub async fn find_within_radius(
    client: PostgresReader,
    lat: f64,
    lon: f64,
    radius_meters: f64,
    filters: &CampaignFilters,
) -> Result<Vec<CampaignWithDistance>, CampaignError> {
    let mut conn = client.get_connection().await?;

    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {CAMPAIGN_COLUMNS}, "));
    push_distance_expr(&mut qb, lat, lon);
    qb.push(" AS distance_meters FROM campaigns WHERE 1=1");
    push_filters(&mut qb, filters);
    // The alias isn't visible in WHERE, so the distance expression repeats.
    qb.push(" AND ");
    push_distance_expr(&mut qb, lat, lon);
    qb.push(" <= ");
    qb.push_bind(radius_meters);
    qb.push(" ORDER BY distance_meters ASC LIMIT ");
    qb.push_bind(filters.limit.unwrap_or(DEFAULT_QUERY_LIMIT));

    let rows = qb
        .build_query_as::<CampaignWithDistance>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

/// The `n` campaigns closest to the point, ascending distance.
pub async fn find_nearest(
    client: PostgresReader,
    lat: f64,
    lon: f64,
    n: i64,
) -> Result<Vec<CampaignWithDistance>, CampaignError> {
    let mut conn = client.get_connection().await?;

    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {CAMPAIGN_COLUMNS}, "));
    push_distance_expr(&mut qb, lat, lon);
    qb.push(" AS distance_meters FROM campaigns ORDER BY distance_meters ASC LIMIT ");
    qb.push_bind(n);

    let rows = qb
        .build_query_as::<CampaignWithDistance>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

/// Campaigns inside the bounding box. Unordered beyond newest-first.
pub async fn find_in_bounds(
    client: PostgresReader,
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
    filters: &CampaignFilters,
) -> Result<Vec<Campaign>, CampaignError> {
    let mut conn = client.get_connection().await?;

    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE latitude BETWEEN "
    ));
    qb.push_bind(min_lat);
    qb.push(" AND ");
    qb.push_bind(max_lat);
    qb.push(" AND longitude BETWEEN ");
    qb.push_bind(min_lon);
    qb.push(" AND ");
    qb.push_bind(max_lon);
    push_filters(&mut qb, filters);
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    qb.push_bind(filters.limit.unwrap_or(DEFAULT_QUERY_LIMIT));

    let rows = qb.build_query_as::<Campaign>().fetch_all(&mut *conn).await?;
    Ok(rows)
}

/// Count, centroid and coverage radius (max member distance from the
/// centroid, meters) for one city. `None` when the city has no campaigns.
pub async fn city_stats(
    client: PostgresReader,
    city: &str,
) -> Result<Option<CityStats>, CampaignError> {
    let mut conn = client.get_connection().await?;

    let row = sqlx::query_as::<_, CityStats>(
        "WITH members AS (
            SELECT latitude, longitude FROM campaigns WHERE lower(city) = lower($1)
        ),
        centroid AS (
            SELECT avg(latitude) AS lat, avg(longitude) AS lon, count(*) AS n FROM members
        )
        SELECT
            $1::text AS city,
            centroid.n AS campaign_count,
            centroid.lat AS centroid_latitude,
            centroid.lon AS centroid_longitude,
            coalesce((
                SELECT max(6371000.0 * 2.0 * asin(sqrt(
                    pow(sin(radians(m.latitude - centroid.lat) / 2.0), 2)
                    + cos(radians(centroid.lat)) * cos(radians(m.latitude))
                    * pow(sin(radians(m.longitude - centroid.lon) / 2.0), 2)
                )))
                FROM members m
            ), 0.0) AS coverage_radius_meters
        FROM centroid
        WHERE centroid.n > 0",
    )
    .bind(city)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

pub async fn create_campaign(
    client: PostgresWriter,
    creator_id: Uuid,
    new_campaign: &NewCampaign,
) -> Result<Campaign, CampaignError> {
    let mut conn = client.get_connection().await?;

    let query = format!(
        "INSERT INTO campaigns
            (id, creator_id, title, description, status, latitude, longitude,
             address, city, state, support_count, oppose_count, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, 0, now(), now())
         RETURNING {CAMPAIGN_COLUMNS}"
    );
    let row = sqlx::query_as::<_, Campaign>(&query)
        .bind(Uuid::new_v4())
        .bind(creator_id)
        .bind(&new_campaign.title)
        .bind(&new_campaign.description)
        .bind(new_campaign.status)
        .bind(new_campaign.latitude)
        .bind(new_campaign.longitude)
        .bind(&new_campaign.address)
        .bind(&new_campaign.city)
        .bind(&new_campaign.state)
        .fetch_one(&mut *conn)
        .await?;

    Ok(row)
}

/// Apply a partial update. `None` when no campaign has the id.
pub async fn update_campaign(
    client: PostgresWriter,
    id: Uuid,
    patch: &CampaignPatch,
) -> Result<Option<Campaign>, CampaignError> {
    let mut conn = client.get_connection().await?;

    let mut qb = QueryBuilder::<Postgres>::new("UPDATE campaigns SET updated_at = now()");
    if let Some(title) = &patch.title {
        qb.push(", title = ");
        qb.push_bind(title.clone());
    }
    if let Some(description) = &patch.description {
        qb.push(", description = ");
        qb.push_bind(description.clone());
    }
    if let Some(status) = patch.status {
        qb.push(", status = ");
        qb.push_bind(status);
    }
    if let Some(latitude) = patch.latitude {
        qb.push(", latitude = ");
        qb.push_bind(latitude);
    }
    if let Some(longitude) = patch.longitude {
        qb.push(", longitude = ");
        qb.push_bind(longitude);
    }
    if let Some(address) = &patch.address {
        qb.push(", address = ");
        qb.push_bind(address.clone());
    }
    if let Some(city) = &patch.city {
        qb.push(", city = ");
        qb.push_bind(city.clone());
    }
    if let Some(state) = &patch.state {
        qb.push(", state = ");
        qb.push_bind(state.clone());
    }
    qb.push(" WHERE id = ");
    qb.push_bind(id);
    qb.push(format!(" RETURNING {CAMPAIGN_COLUMNS}"));

    let row = qb
        .build_query_as::<Campaign>()
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// Delete a campaign, returning its creator id (the caller invalidates the
/// creator's cached lists). `None` when no campaign has the id. Votes go
/// with it via ON DELETE CASCADE.
pub async fn delete_campaign(
    client: PostgresWriter,
    id: Uuid,
) -> Result<Option<Uuid>, CampaignError> {
    let mut conn = client.get_connection().await?;

    let row: Option<(Uuid,)> =
        sqlx::query_as("DELETE FROM campaigns WHERE id = $1 RETURNING creator_id")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(row.map(|(creator_id,)| creator_id))
}

/// Upsert the user's vote and refresh the embedded counters, in one
/// transaction. Re-casting the same direction is a no-op at the SQL level.
/// `None` when no campaign has the id.
pub async fn cast_vote(
    client: PostgresWriter,
    campaign_id: Uuid,
    user_id: Uuid,
    direction: VoteDirection,
) -> Result<Option<Campaign>, CampaignError> {
    let mut conn = client.get_connection().await?;
    let mut tx = sqlx::Connection::begin(&mut *conn).await?;

    let exists: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM campaigns WHERE id = $1 FOR UPDATE")
            .bind(campaign_id)
            .fetch_optional(&mut *tx)
            .await?;
    if exists.is_none() {
        return Ok(None);
    }

    sqlx::query(
        "INSERT INTO campaign_votes (campaign_id, user_id, direction, created_at, updated_at)
         VALUES ($1, $2, $3, now(), now())
         ON CONFLICT (campaign_id, user_id)
         DO UPDATE SET direction = EXCLUDED.direction, updated_at = now()",
    )
    .bind(campaign_id)
    .bind(user_id)
    .bind(direction)
    .execute(&mut *tx)
    .await?;

    // Counters are recomputed from the votes table rather than incremented,
    // so a changed vote adjusts both sides correctly.
    let query = format!(
        "UPDATE campaigns SET
            support_count = (SELECT count(*) FROM campaign_votes
                             WHERE campaign_id = $1 AND direction = 'SUPPORT'),
            oppose_count = (SELECT count(*) FROM campaign_votes
                            WHERE campaign_id = $1 AND direction = 'OPPOSE'),
            updated_at = now()
         WHERE id = $1
         RETURNING {CAMPAIGN_COLUMNS}"
    );
    let updated = sqlx::query_as::<_, Campaign>(&query)
        .bind(campaign_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Some(updated))
}
