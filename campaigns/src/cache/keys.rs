//! Deterministic cache-key derivation.
//!
//! Two logically-equivalent queries must always produce byte-equal keys:
//! filter segments are sorted alphabetically by name (never caller order),
//! query text is normalized, and coordinates are formatted with the fixed
//! decimal-place policy of the active precision tier. Absent optional
//! filters are omitted entirely - "no filter" and "empty-string filter"
//! normalize to the same key by policy, rather than diverging silently.
//!
//! Keys are plain `:`-joined concatenations, not hashes, so two different
//! parameter sets cannot collide by construction.

use uuid::Uuid;

use crate::cache::policy::PrecisionTier;
use crate::campaigns::campaign_models::CampaignFilters;

pub const SEARCH_KEY_PREFIX: &str = "search:";
pub const GEO_KEY_PREFIX: &str = "geo:";
pub const CAMPAIGN_KEY_PREFIX: &str = "campaign:";
pub const USER_KEY_PREFIX: &str = "user:";

/// Normalize free text for key derivation: trim, lowercase, collapse
/// whitespace runs to single spaces.
pub fn normalize_query(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// Filter text values (city, state) normalize the same way as query text.
// A blank value is treated as absent.
fn normalize_filter_text(raw: &str) -> Option<String> {
    let normalized = normalize_query(raw);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Format a coordinate with the tier's fixed decimal count, so nearby
/// queries share a bucket and float representation noise cannot split one.
pub fn bucket_coordinate(value: f64, tier: PrecisionTier) -> String {
    let formatted = format!("{:.*}", tier.decimal_places(), value);
    // "-0.00" and "0.00" are the same bucket
    if formatted.starts_with('-') && formatted[1..].chars().all(|c| c == '0' || c == '.') {
        formatted[1..].to_string()
    } else {
        formatted
    }
}

// Canonical filter encoding: one ":name=value" segment per present filter,
// sorted alphabetically by name so the key never depends on how the caller
// assembled the filter set.
fn encode_filters(filters: &CampaignFilters) -> String {
    let mut segments: Vec<(&str, String)> = Vec::new();

    if let Some(city) = filters.city.as_deref().and_then(normalize_filter_text) {
        segments.push(("city", city));
    }
    if let Some(cursor) = filters.cursor {
        segments.push(("cursor", cursor.to_string()));
    }
    if let Some(limit) = filters.limit {
        segments.push(("limit", limit.to_string()));
    }
    if let Some(state) = filters.state.as_deref().and_then(normalize_filter_text) {
        segments.push(("state", state));
    }
    if let Some(status) = filters.status {
        segments.push(("status", status.to_string()));
    }

    segments.sort_by_key(|(name, _)| *name);
    segments
        .into_iter()
        .map(|(name, value)| format!(":{name}={value}"))
        .collect()
}

/// `search:{query}` plus canonical filters. Callers pass the already
/// normalized query so the producer sees exactly what the key encodes.
pub fn search_key(normalized_query: &str, filters: &CampaignFilters) -> String {
    format!(
        "{SEARCH_KEY_PREFIX}{normalized_query}{}",
        encode_filters(filters)
    )
}

/// `geo:radius:{lat}:{lon}:{radius_m}` plus canonical filters. The radius
/// is encoded in whole meters; coordinates are bucketed to the tier.
pub fn geo_radius_key(
    lat: f64,
    lon: f64,
    radius_meters: f64,
    tier: PrecisionTier,
    filters: &CampaignFilters,
) -> String {
    format!(
        "{GEO_KEY_PREFIX}radius:{}:{}:{:.0}{}",
        bucket_coordinate(lat, tier),
        bucket_coordinate(lon, tier),
        radius_meters,
        encode_filters(filters)
    )
}

/// `geo:nearest:{lat}:{lon}:limit={n}`.
pub fn geo_nearest_key(lat: f64, lon: f64, n: i64, tier: PrecisionTier) -> String {
    format!(
        "{GEO_KEY_PREFIX}nearest:{}:{}:limit={n}",
        bucket_coordinate(lat, tier),
        bucket_coordinate(lon, tier),
    )
}

/// `geo:bounds:{min_lat}:{min_lon}:{max_lat}:{max_lon}` plus canonical
/// filters, all four edges bucketed.
pub fn geo_bounds_key(
    min_lat: f64,
    min_lon: f64,
    max_lat: f64,
    max_lon: f64,
    tier: PrecisionTier,
    filters: &CampaignFilters,
) -> String {
    format!(
        "{GEO_KEY_PREFIX}bounds:{}:{}:{}:{}{}",
        bucket_coordinate(min_lat, tier),
        bucket_coordinate(min_lon, tier),
        bucket_coordinate(max_lat, tier),
        bucket_coordinate(max_lon, tier),
        encode_filters(filters)
    )
}

/// `geo:city:{city}` - sits under the geo namespace so the broad geo sweep
/// clears city aggregates too.
pub fn city_stats_key(city: &str) -> String {
    format!("{GEO_KEY_PREFIX}city:{}", normalize_query(city))
}

/// `campaign:{id}` - exact, no bucketing.
pub fn campaign_key(id: Uuid) -> String {
    format!("{CAMPAIGN_KEY_PREFIX}{id}")
}

/// `user:{id}:campaigns` plus canonical filters.
pub fn user_campaigns_key(user_id: Uuid, filters: &CampaignFilters) -> String {
    format!(
        "{USER_KEY_PREFIX}{user_id}:campaigns{}",
        encode_filters(filters)
    )
}

/// Prefix that matches every key the given user owns.
pub fn user_prefix(user_id: Uuid) -> String {
    format!("{USER_KEY_PREFIX}{user_id}:")
}
