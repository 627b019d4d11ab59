use crate::config::ConfigError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gk_cache::CacheError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load key: {0}")]
    KeyLoad(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid claims: {0}")]
    InvalidClaims(String),

    /// `login_url` is set when the caller should be redirected to the login
    /// page instead of receiving a 401.
    #[error("Authentication required")]
    Unauthenticated { login_url: Option<String> },

    #[error("Access denied")]
    Forbidden,

    #[error("Internal server error")]
    Internal,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for GkError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GkError::Unauthenticated {
                login_url: Some(login_url),
            } => {
                return (StatusCode::SEE_OTHER, [(header::LOCATION, login_url.clone())])
                    .into_response();
            }
            GkError::Unauthenticated { login_url: None } => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authentication required".to_string(),
            ),
            GkError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "You do not have access to this resource".to_string(),
            ),
            GkError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIGURATION_ERROR",
                "Service is misconfigured".to_string(),
            ),
            GkError::KeyLoad(_) | GkError::Crypto(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CRYPTO_ERROR",
                "An internal cryptographic error occurred".to_string(),
            ),
            GkError::Cache(e) if e.is_unavailable() => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CACHE_UNAVAILABLE",
                "Service temporarily unavailable".to_string(),
            ),
            GkError::Cache(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CACHE_ERROR",
                "An internal cache error occurred".to_string(),
            ),
            GkError::InvalidClaims(_) | GkError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorDetail { code, message },
            }),
        )
            .into_response()
    }
}
