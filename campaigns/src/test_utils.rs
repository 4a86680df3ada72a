use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use common_redis::{Client as RedisClient, MockRedisClient};

use crate::campaigns::campaign_models::{Campaign, CampaignStatus};

/// A campaign row as the producers would return it.
pub fn test_campaign(title: &str, city: &str) -> Campaign {
    let now = Utc::now();
    Campaign {
        id: Uuid::new_v4(),
        creator_id: Uuid::new_v4(),
        title: title.to_string(),
        description: format!("{title} - a local proposal"),
        status: CampaignStatus::Active,
        latitude: 37.7749,
        longitude: -122.4194,
        address: None,
        city: city.to_string(),
        state: "IL".to_string(),
        support_count: 0,
        oppose_count: 0,
        created_at: now,
        updated_at: now,
    }
}

/// Mock store plus a trait-object handle to it; the mock clone shares the
/// same keyspace and call log, so tests can assert on either.
pub fn setup_mock_redis() -> (Arc<dyn RedisClient + Send + Sync>, MockRedisClient) {
    let mock = MockRedisClient::new();
    let client: Arc<dyn RedisClient + Send + Sync> = Arc::new(mock.clone());
    (client, mock)
}
