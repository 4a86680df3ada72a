use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use common_database::{is_timeout_error, CustomDatabaseError};
use serde::Serialize;
use thiserror::Error;

/// Structured error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
    pub detail: String,
}

#[derive(Error, Debug)]
pub enum ClientFacingError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Service unavailable")]
    ServiceUnavailable,
}

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error(transparent)]
    ClientFacing(#[from] ClientFacingError),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("No user id in request")]
    MissingUserId,
    #[error("Campaign not found")]
    CampaignNotFound,
    #[error("No campaigns found for city")]
    CityNotFound,
    #[error("failed to parse redis cache data")]
    RedisDataParsingError,
    #[error("redis unavailable")]
    RedisUnavailable,
    #[error("database unavailable")]
    DatabaseUnavailable,
    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),
    #[error("Timed out while fetching data")]
    TimeoutError,
}

impl CampaignError {
    /// Returns (error_code, status_code) for this error.
    ///
    /// This consolidates error classification in one place to ensure
    /// consistency between error codes and HTTP status codes, and makes
    /// adding new error variants easier (only one match statement to update).
    fn error_metadata(&self) -> (&'static str, u16) {
        match self {
            // Client-facing errors
            CampaignError::ClientFacing(ClientFacingError::BadRequest(_)) => ("bad_request", 400),
            CampaignError::ClientFacing(ClientFacingError::Unauthorized(_)) => {
                ("unauthorized", 401)
            }
            CampaignError::ClientFacing(ClientFacingError::ServiceUnavailable) => {
                ("service_unavailable", 503)
            }
            CampaignError::MissingUserId => ("missing_user_id", 401),

            // Not found (404)
            CampaignError::CampaignNotFound => ("campaign_not_found", 404),
            CampaignError::CityNotFound => ("city_not_found", 404),

            // Internal server errors (500)
            CampaignError::Internal(_) => ("internal_error", 500),
            CampaignError::DatabaseError(_) => ("database_error", 500),

            // Service unavailable errors (503)
            CampaignError::RedisDataParsingError => ("redis_parsing_error", 503),
            CampaignError::RedisUnavailable => ("redis_unavailable", 503),
            CampaignError::DatabaseUnavailable => ("database_unavailable", 503),
            CampaignError::TimeoutError => ("timeout", 503),
        }
    }

    /// Returns a short error code for canonical logging.
    pub fn error_code(&self) -> &'static str {
        self.error_metadata().0
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.error_metadata().1).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for CampaignError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "request failed: {}", self);
        }

        let body = ErrorResponse {
            error_type: if status.is_client_error() {
                "invalid_request".to_string()
            } else {
                "server_error".to_string()
            },
            code: self.error_code().to_string(),
            detail: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<CustomDatabaseError> for CampaignError {
    fn from(e: CustomDatabaseError) -> Self {
        match e {
            CustomDatabaseError::Other(err) if is_timeout_error(&err) => {
                CampaignError::TimeoutError
            }
            CustomDatabaseError::Other(err) => CampaignError::DatabaseError(err),
            CustomDatabaseError::Timeout(_) => CampaignError::TimeoutError,
        }
    }
}

impl From<sqlx::Error> for CampaignError {
    fn from(e: sqlx::Error) -> Self {
        if is_timeout_error(&e) {
            CampaignError::TimeoutError
        } else {
            CampaignError::DatabaseError(e)
        }
    }
}
