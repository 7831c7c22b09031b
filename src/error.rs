//! Error types for the lyrics cache service
//!
//! Provides unified error handling using thiserror. Cache misses are never
//! errors: lookups return `Option` and only infrastructure faults land here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised by the persistent cache backends.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation on a backend that is closed or was never connected
    #[error("Cache backend not connected")]
    NotConnected,

    /// Store did not answer within the operation deadline
    #[error("Timed out during {op}")]
    Timeout { op: &'static str },

    /// Redis client or command failure
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Postgres pool or query failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Durable structure could not be provisioned
    #[error("Schema provisioning failed: {0}")]
    Schema(String),
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

// == API Error Enum ==
/// Errors returned by the HTTP handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The lyrics source failed or found nothing
    #[error("Upstream lookup failed: {0}")]
    Upstream(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Result type of the HTTP handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
