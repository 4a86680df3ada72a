pub mod campaign_models;
pub mod campaign_operations;
