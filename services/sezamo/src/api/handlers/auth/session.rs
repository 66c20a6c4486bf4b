//! Session inspection and sign-out endpoints, plus cookie helpers.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::state::{AuthConfig, AuthState};
use super::storage::{SessionRecord, end_session, lookup_session};
use super::types::{SessionInfo, SessionResponse, SignoutResponse, UserSummary};
use super::utils::hash_token;

pub(crate) const SESSION_COOKIE_NAME: &str = "session-token";

/// Return the current session and user, or 401 with a cleared cookie.
#[utoipa::path(
    get,
    path = "/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 401, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(token) = extract_session_token(&headers) else {
        return no_session_response(auth_state.config());
    };
    // Only the hash is stored; never compare raw tokens against the database.
    let session_hash = hash_token(&token);
    match lookup_session(&pool, &session_hash).await {
        Ok(Some(record)) => {
            let response = SessionResponse {
                success: true,
                user: UserSummary {
                    id: record.user_id.to_string(),
                    email: record.email,
                    name: record.name,
                },
                session: SessionInfo {
                    tenant_id: record.tenant_id.map(|id| id.to_string()),
                    tenant_slug: record.tenant_slug,
                    created_at: record.created_at,
                    expires_at: record.expires_at,
                    login_method: record.login_method,
                },
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        // Expired or ended cookies are cleared so the browser stops resending them.
        Ok(None) => no_session_response(auth_state.config()),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// End the current session. Idempotent: succeeds even without a session.
#[utoipa::path(
    post,
    path = "/auth/signout",
    responses(
        (status = 200, description = "Session ended and cookie cleared", body = SignoutResponse)
    ),
    tag = "auth"
)]
pub async fn signout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        let session_hash = hash_token(&token);
        match pool.begin().await {
            Ok(mut tx) => {
                if let Err(err) = end_session(&mut tx, &session_hash, "logout").await {
                    error!("Failed to end session: {err}");
                    let _ = tx.rollback().await;
                } else if let Err(err) = tx.commit().await {
                    error!("Failed to commit signout: {err}");
                }
            }
            Err(err) => error!("Failed to start signout transaction: {err}"),
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(SignoutResponse { success: true }),
    )
        .into_response()
}

/// Resolve a session cookie into a session record, if present.
///
/// Returns `Ok(None)` when the cookie is missing or does not match an active,
/// unexpired session.
pub(crate) async fn authenticate_session(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<SessionRecord>, StatusCode> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    let session_hash = hash_token(&token);
    match lookup_session(pool, &session_hash).await {
        Ok(record) => Ok(record),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Build the `HttpOnly` session cookie with the given max-age.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    token: &str,
    ttl_seconds: i64,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(
    config: &AuthConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn no_session_response(config: &AuthConfig) -> axum::response::Response {
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(config) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::UNAUTHORIZED,
        response_headers,
        Json(serde_json::json!({"success": false, "error": "no_session"})),
    )
        .into_response()
}

/// Pull the session token out of the cookie header. Cookie-only; there is
/// no bearer fallback.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let Some((key, val)) = pair.trim().split_once('=') else {
            continue;
        };
        if key.trim() == SESSION_COOKIE_NAME {
            return Some(val.trim().to_string());
        }
    }
    None
}
