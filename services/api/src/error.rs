//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and its
//! HTTP rendering. Every response body follows the same `{"message": ...}`
//! shape; internal detail is logged, never surfaced.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::config::ConfigError;
use quill_core::ports::PortError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Login failed. Unknown email and wrong password share this variant so
    /// the response cannot be used to probe which emails are registered.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Registration attempted with an email that already has an account.
    #[error("Email already in use")]
    EmailInUse,

    /// A request body failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Refresh was called without a refresh token cookie.
    #[error("No refresh token")]
    NoRefreshToken,

    /// The presented refresh token has no server-side record: it was rotated,
    /// revoked at logout, or is being replayed.
    #[error("Refresh token revoked or invalid")]
    RevokedToken,

    /// The presented refresh token failed cryptographic verification or its
    /// subject no longer exists.
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// The access token is missing, malformed, expired, or forged.
    #[error("Invalid or missing access token")]
    Unauthenticated,

    /// The caller is authenticated but not allowed to perform this action.
    #[error("Forbidden")]
    Forbidden,

    /// A named resource does not exist (or is not visible to the caller).
    #[error("{0} not found")]
    NotFound(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidCredentials => {
                (StatusCode::BAD_REQUEST, "Invalid credentials".to_string())
            }
            ApiError::EmailInUse => {
                (StatusCode::BAD_REQUEST, "Email already in use".to_string())
            }
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NoRefreshToken => {
                (StatusCode::UNAUTHORIZED, "No refresh token".to_string())
            }
            ApiError::RevokedToken => (
                StatusCode::UNAUTHORIZED,
                "Refresh token revoked or invalid".to_string(),
            ),
            ApiError::InvalidRefreshToken => {
                (StatusCode::UNAUTHORIZED, "Invalid refresh token".to_string())
            }
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Invalid or missing access token".to_string(),
            ),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::NotFound(what) => {
                (StatusCode::NOT_FOUND, format!("{} not found", what))
            }
            ApiError::Port(PortError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, msg.clone())
            }
            ApiError::Port(PortError::Conflict(msg)) => {
                (StatusCode::CONFLICT, msg.clone())
            }
            other => {
                error!("internal error: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn rendered(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn token_failures_map_to_401() {
        for err in [
            ApiError::NoRefreshToken,
            ApiError::RevokedToken,
            ApiError::InvalidRefreshToken,
            ApiError::Unauthenticated,
        ] {
            let (status, _) = rendered(err).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn port_errors_keep_their_messages() {
        let (status, body) =
            rendered(ApiError::Port(PortError::NotFound("Article not found".to_string()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Article not found");

        let (status, body) =
            rendered(ApiError::Port(PortError::Conflict("Email already in use".to_string()))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Email already in use");
    }

    #[tokio::test]
    async fn internal_detail_never_reaches_the_body() {
        let (status, body) =
            rendered(ApiError::Internal("pool exhausted on shard 7".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn credential_failures_are_bad_requests() {
        let (status, body) = rendered(ApiError::InvalidCredentials).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid credentials");

        let (status, _) = rendered(ApiError::EmailInUse).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
