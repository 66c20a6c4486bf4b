//! Error taxonomy for the auth and tenant endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

/// Auth-path failures mapped to stable HTTP responses.
///
/// Invalid and expired credentials share one opaque message so callers cannot
/// distinguish "wrong code" from "already used". Database errors are logged
/// server-side and surfaced as `500` without leaking details.
#[derive(Debug)]
pub enum AuthError {
    /// Missing or malformed request fields.
    Validation(&'static str),
    /// Token or code did not match an unused, unexpired row.
    InvalidOrExpired,
    /// Authenticated but not allowed: no tenant membership, access denied.
    Forbidden(&'static str),
    /// No valid session for a cookie-gated endpoint.
    NoSession,
    Database(sqlx::Error),
    Internal(anyhow::Error),
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err)
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "error": message})),
            )
                .into_response(),
            Self::InvalidOrExpired => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"success": false, "error": "invalid_or_expired"})),
            )
                .into_response(),
            Self::Forbidden(message) => (
                StatusCode::FORBIDDEN,
                Json(json!({"success": false, "error": message})),
            )
                .into_response(),
            Self::NoSession => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"success": false, "error": "no_session"})),
            )
                .into_response(),
            Self::Database(err) => {
                error!("Database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"success": false, "error": "internal_error"})),
                )
                    .into_response()
            }
            Self::Internal(err) => {
                error!("Internal error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"success": false, "error": "internal_error"})),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            AuthError::Validation("email is required")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::InvalidOrExpired.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Forbidden("no_tenant").into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::NoSession.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Database(sqlx::Error::RowNotFound)
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
