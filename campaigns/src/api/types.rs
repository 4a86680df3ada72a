use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::errors::{CampaignError, ClientFacingError};
use crate::cache::policy::{MAX_RADIUS_METERS, MIN_RADIUS_METERS};
use crate::campaigns::campaign_models::{
    Campaign, CampaignFilters, CampaignPatch, CampaignStatus, CampaignWithDistance, CityStats,
    NewCampaign, VoteDirection,
};

pub const MAX_QUERY_LIMIT: i64 = 100;
pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_DESCRIPTION_LENGTH: usize = 5000;

fn bad_request(detail: impl Into<String>) -> CampaignError {
    ClientFacingError::BadRequest(detail.into()).into()
}

fn validate_latitude(lat: f64) -> Result<(), CampaignError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(bad_request(format!("latitude out of range: {lat}")));
    }
    Ok(())
}

fn validate_longitude(lon: f64) -> Result<(), CampaignError> {
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(bad_request(format!("longitude out of range: {lon}")));
    }
    Ok(())
}

fn validate_limit(limit: Option<i64>) -> Result<(), CampaignError> {
    if let Some(limit) = limit {
        if !(1..=MAX_QUERY_LIMIT).contains(&limit) {
            return Err(bad_request(format!(
                "limit must be between 1 and {MAX_QUERY_LIMIT}, got {limit}"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQueryParams {
    pub q: String,
    pub status: Option<CampaignStatus>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<Uuid>,
}

impl SearchQueryParams {
    pub fn validate(&self) -> Result<(), CampaignError> {
        if self.q.trim().is_empty() {
            return Err(bad_request("search query must not be blank"));
        }
        validate_limit(self.limit)
    }

    pub fn filters(&self) -> CampaignFilters {
        CampaignFilters {
            status: self.status,
            city: self.city.clone(),
            state: self.state.clone(),
            limit: self.limit,
            cursor: self.cursor,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NearbyQueryParams {
    pub lat: f64,
    pub lon: f64,
    pub radius_meters: Option<f64>,
    pub status: Option<CampaignStatus>,
    pub limit: Option<i64>,
}

impl NearbyQueryParams {
    pub fn validate(&self) -> Result<(), CampaignError> {
        validate_latitude(self.lat)?;
        validate_longitude(self.lon)?;
        if let Some(radius) = self.radius_meters {
            if !radius.is_finite() || !(MIN_RADIUS_METERS..=MAX_RADIUS_METERS).contains(&radius) {
                return Err(bad_request(format!(
                    "radius_meters must be between {MIN_RADIUS_METERS} and {MAX_RADIUS_METERS}, got {radius}"
                )));
            }
        }
        validate_limit(self.limit)
    }

    pub fn filters(&self) -> CampaignFilters {
        CampaignFilters {
            status: self.status,
            limit: self.limit,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NearestQueryParams {
    pub lat: f64,
    pub lon: f64,
    pub limit: Option<i64>,
}

impl NearestQueryParams {
    pub fn validate(&self) -> Result<(), CampaignError> {
        validate_latitude(self.lat)?;
        validate_longitude(self.lon)?;
        validate_limit(self.limit)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithinQueryParams {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
    pub status: Option<CampaignStatus>,
    pub limit: Option<i64>,
}

impl WithinQueryParams {
    pub fn validate(&self) -> Result<(), CampaignError> {
        validate_latitude(self.min_lat)?;
        validate_latitude(self.max_lat)?;
        validate_longitude(self.min_lon)?;
        validate_longitude(self.max_lon)?;
        if self.min_lat >= self.max_lat || self.min_lon >= self.max_lon {
            return Err(bad_request("bounding box edges are inverted"));
        }
        validate_limit(self.limit)
    }

    pub fn filters(&self) -> CampaignFilters {
        CampaignFilters {
            status: self.status,
            limit: self.limit,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MineQueryParams {
    pub status: Option<CampaignStatus>,
    pub limit: Option<i64>,
    pub cursor: Option<Uuid>,
}

impl MineQueryParams {
    pub fn validate(&self) -> Result<(), CampaignError> {
        validate_limit(self.limit)
    }

    pub fn filters(&self) -> CampaignFilters {
        CampaignFilters {
            status: self.status,
            limit: self.limit,
            cursor: self.cursor,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignRequest {
    pub title: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub city: String,
    pub state: String,
    pub status: Option<CampaignStatus>,
}

impl CreateCampaignRequest {
    pub fn validate(&self) -> Result<(), CampaignError> {
        if self.title.trim().is_empty() {
            return Err(bad_request("title must not be blank"));
        }
        if self.title.len() > MAX_TITLE_LENGTH {
            return Err(bad_request(format!(
                "title must be at most {MAX_TITLE_LENGTH} characters"
            )));
        }
        if self.description.trim().is_empty() {
            return Err(bad_request("description must not be blank"));
        }
        if self.description.len() > MAX_DESCRIPTION_LENGTH {
            return Err(bad_request(format!(
                "description must be at most {MAX_DESCRIPTION_LENGTH} characters"
            )));
        }
        if self.city.trim().is_empty() || self.state.trim().is_empty() {
            return Err(bad_request("city and state must not be blank"));
        }
        validate_latitude(self.latitude)?;
        validate_longitude(self.longitude)
    }

    pub fn to_new_campaign(&self) -> NewCampaign {
        NewCampaign {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            status: self.status.unwrap_or(CampaignStatus::Active),
            latitude: self.latitude,
            longitude: self.longitude,
            address: self.address.clone(),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCampaignRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<CampaignStatus>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl UpdateCampaignRequest {
    pub fn validate(&self) -> Result<(), CampaignError> {
        if self.to_patch().is_empty() {
            return Err(bad_request("update contains no fields"));
        }
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(bad_request("title must not be blank"));
            }
            if title.len() > MAX_TITLE_LENGTH {
                return Err(bad_request(format!(
                    "title must be at most {MAX_TITLE_LENGTH} characters"
                )));
            }
        }
        if let Some(description) = &self.description {
            if description.trim().is_empty() {
                return Err(bad_request("description must not be blank"));
            }
        }
        if let Some(lat) = self.latitude {
            validate_latitude(lat)?;
        }
        if let Some(lon) = self.longitude {
            validate_longitude(lon)?;
        }
        Ok(())
    }

    pub fn to_patch(&self) -> CampaignPatch {
        CampaignPatch {
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status,
            latitude: self.latitude,
            longitude: self.longitude,
            address: self.address.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteRequest {
    pub direction: VoteDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub status: CampaignStatus,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub city: String,
    pub state: String,
    pub support_count: i64,
    pub oppose_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Present only on geo query results. Distances are meters everywhere
    /// inside the service; this is the single point where they become
    /// kilometers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

fn meters_to_km(meters: f64) -> f64 {
    // round to whole meters first so the km value has at most 3 decimals
    meters.round() / 1000.0
}

impl From<Campaign> for CampaignResponse {
    fn from(campaign: Campaign) -> Self {
        Self {
            id: campaign.id,
            creator_id: campaign.creator_id,
            title: campaign.title,
            description: campaign.description,
            status: campaign.status,
            latitude: campaign.latitude,
            longitude: campaign.longitude,
            address: campaign.address,
            city: campaign.city,
            state: campaign.state,
            support_count: campaign.support_count,
            oppose_count: campaign.oppose_count,
            created_at: campaign.created_at,
            updated_at: campaign.updated_at,
            distance_km: None,
        }
    }
}

impl From<CampaignWithDistance> for CampaignResponse {
    fn from(row: CampaignWithDistance) -> Self {
        let mut response: CampaignResponse = row.campaign.into();
        response.distance_km = Some(meters_to_km(row.distance_meters));
        response
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignListResponse {
    pub results: Vec<CampaignResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityStatsResponse {
    pub city: String,
    pub campaign_count: i64,
    pub centroid_latitude: f64,
    pub centroid_longitude: f64,
    pub coverage_radius_km: f64,
}

impl From<CityStats> for CityStatsResponse {
    fn from(stats: CityStats) -> Self {
        Self {
            city: stats.city,
            campaign_count: stats.campaign_count,
            centroid_latitude: stats.centroid_latitude,
            centroid_longitude: stats.centroid_longitude,
            coverage_radius_km: meters_to_km(stats.coverage_radius_meters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_campaign;

    fn search_params(q: &str) -> SearchQueryParams {
        SearchQueryParams {
            q: q.to_string(),
            status: None,
            city: None,
            state: None,
            limit: None,
            cursor: None,
        }
    }

    #[test]
    fn test_blank_search_query_rejected() {
        assert!(search_params("   ").validate().is_err());
        assert!(search_params("bike lane").validate().is_ok());
    }

    #[test]
    fn test_limit_bounds() {
        let mut params = search_params("parks");
        params.limit = Some(0);
        assert!(params.validate().is_err());
        params.limit = Some(MAX_QUERY_LIMIT + 1);
        assert!(params.validate().is_err());
        params.limit = Some(MAX_QUERY_LIMIT);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_nearby_coordinate_and_radius_validation() {
        let mut params = NearbyQueryParams {
            lat: 37.77,
            lon: -122.42,
            radius_meters: None,
            status: None,
            limit: None,
        };
        assert!(params.validate().is_ok());

        params.lat = 91.0;
        assert!(params.validate().is_err());
        params.lat = 37.77;

        params.lon = -181.0;
        assert!(params.validate().is_err());
        params.lon = -122.42;

        params.radius_meters = Some(MIN_RADIUS_METERS - 1.0);
        assert!(params.validate().is_err());
        params.radius_meters = Some(MAX_RADIUS_METERS + 1.0);
        assert!(params.validate().is_err());
        params.radius_meters = Some(f64::NAN);
        assert!(params.validate().is_err());
        params.radius_meters = Some(5000.0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let params = WithinQueryParams {
            min_lat: 38.0,
            min_lon: -122.0,
            max_lat: 37.0,
            max_lon: -121.0,
            status: None,
            limit: None,
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_create_request_validation() {
        let mut request = CreateCampaignRequest {
            title: "Bike Lane on Elm St".to_string(),
            description: "Protected bike lane for Elm St".to_string(),
            latitude: 37.77,
            longitude: -122.42,
            address: None,
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            status: None,
        };
        assert!(request.validate().is_ok());
        assert_eq!(request.to_new_campaign().status, CampaignStatus::Active);

        request.title = "  ".to_string();
        assert!(request.validate().is_err());
        request.title = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_empty_update_rejected() {
        assert!(UpdateCampaignRequest::default().validate().is_err());
        let update = UpdateCampaignRequest {
            status: Some(CampaignStatus::Closed),
            ..Default::default()
        };
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_distance_converted_to_km_at_boundary() {
        let row = CampaignWithDistance {
            campaign: test_campaign("Bike Lane on Elm St", "Springfield"),
            distance_meters: 1234.4,
        };
        let response: CampaignResponse = row.into();
        assert_eq!(response.distance_km, Some(1.234));

        let plain: CampaignResponse = test_campaign("Bike Lane on Elm St", "Springfield").into();
        assert_eq!(plain.distance_km, None);
    }
}
