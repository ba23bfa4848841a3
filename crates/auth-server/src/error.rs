//! Unified error handling for the auth server.
//!
//! Handlers return [`ApiResult`] and use `?` freely; every error variant maps to
//! exactly one HTTP status and a JSON [`ErrorResponse`] body, so no handler exit
//! path is left without a response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::types::StrategyError;
use crate::repository::StoreError;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Unified error type for API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// User store failure (duplicate key or driver error)
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Authentication strategy failed hard (not a credential rejection)
    #[error(transparent)]
    Strategy(#[from] StrategyError),

    /// Session token could not be signed
    #[error("Session error: {0}")]
    Session(#[from] jsonwebtoken::errors::Error),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server is missing configuration needed by this route
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication required but not provided or invalid
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }
}

fn store_error_parts(err: &StoreError) -> (StatusCode, String, Option<String>) {
    match err {
        StoreError::Duplicate(what) => (
            StatusCode::CONFLICT,
            format!("{} already exists", what),
            None,
        ),
        StoreError::Database(e) => {
            tracing::error!("Database error: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database operation failed".to_string(),
                None,
            )
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            ApiError::Store(e) | ApiError::Strategy(StrategyError::Store(e)) => {
                store_error_parts(e)
            }
            ApiError::Strategy(e) => {
                tracing::error!("Authentication strategy error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Authentication failed".to_string(),
                    None,
                )
            }
            ApiError::Session(e) => {
                tracing::error!("Session signing error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not establish session".to_string(),
                    None,
                )
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            ApiError::Config(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server configuration error".to_string(),
                    None,
                )
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
