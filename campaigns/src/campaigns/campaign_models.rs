use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a campaign. Stored as TEXT in postgres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum CampaignStatus {
    Draft,
    Active,
    Closed,
    Archived,
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignStatus::Draft => write!(f, "DRAFT"),
            CampaignStatus::Active => write!(f, "ACTIVE"),
            CampaignStatus::Closed => write!(f, "CLOSED"),
            CampaignStatus::Archived => write!(f, "ARCHIVED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum VoteDirection {
    Support,
    Oppose,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Campaign {
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
}

/// A campaign row returned by the radius/nearest producers.
/// `distance_meters` stays in meters everywhere inside the service; the API
/// layer converts to kilometers when building the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CampaignWithDistance {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub campaign: Campaign,
    pub distance_meters: f64,
}

/// Aggregate view of one city's campaigns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CityStats {
    pub city: String,
    pub campaign_count: i64,
    pub centroid_latitude: f64,
    pub centroid_longitude: f64,
    pub coverage_radius_meters: f64,
}

/// Fields for a campaign being created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCampaign {
    pub title: String,
    pub description: String,
    pub status: CampaignStatus,
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
    pub city: String,
    pub state: String,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<CampaignStatus>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl CampaignPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.address.is_none()
            && self.city.is_none()
            && self.state.is_none()
    }
}

/// Optional narrowing filters shared by the search/geo/user-list producers.
///
/// The same struct feeds both the SQL producers and cache-key derivation, so
/// a filter that affects the result set always affects the key too.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CampaignFilters {
    pub status: Option<CampaignStatus>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&CampaignStatus::Active).unwrap(),
            "\"ACTIVE\""
        );
        assert_eq!(
            serde_json::from_str::<CampaignStatus>("\"ARCHIVED\"").unwrap(),
            CampaignStatus::Archived
        );
        assert_eq!(CampaignStatus::Draft.to_string(), "DRAFT");
    }

    #[test]
    fn test_vote_direction_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&VoteDirection::Support).unwrap(),
            "\"SUPPORT\""
        );
        assert_eq!(
            serde_json::from_str::<VoteDirection>("\"OPPOSE\"").unwrap(),
            VoteDirection::Oppose
        );
    }
}
