//! Token and code verification endpoints.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, header::SET_COOKIE},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::api::handlers::tenants::storage::{first_membership, is_member};

use super::error::AuthError;
use super::session::session_cookie;
use super::state::AuthState;
use super::storage::{consume_token_by_code, consume_token_by_link, insert_session};
use super::types::{UserSummary, VerifyCodeRequest, VerifyRequest, VerifyResponse};
use super::utils::{extract_client_ip, extract_user_agent, normalize_email};

/// The two interchangeable credentials a magic token row backs.
enum Credential {
    Link { token: String, email: String },
    Code { email: String, code: String },
}

impl Credential {
    const fn login_method(&self) -> &'static str {
        match self {
            Self::Link { .. } => "magic_link",
            Self::Code { .. } => "code",
        }
    }
}

/// Exchange a magic link token for a 30-day session.
#[utoipa::path(
    post,
    path = "/auth/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Session created", body = VerifyResponse),
        (status = 401, description = "Invalid or expired token"),
        (status = 403, description = "User has no tenant membership")
    ),
    tag = "auth"
)]
pub async fn verify(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("token and email are required"));
    };
    let token = request.token.trim().to_string();
    let email = normalize_email(&request.email);
    if token.is_empty() || email.is_empty() {
        return Err(AuthError::Validation("token and email are required"));
    }

    let ttl = auth_state.config().link_session_ttl_seconds();
    establish_session(
        &headers,
        &pool,
        &auth_state,
        ttl,
        Credential::Link { token, email },
    )
    .await
}

/// Exchange a 6-digit code for a 7-day session.
#[utoipa::path(
    post,
    path = "/auth/verify-code",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Session created", body = VerifyResponse),
        (status = 401, description = "Invalid or expired code"),
        (status = 403, description = "User has no tenant membership")
    ),
    tag = "auth"
)]
pub async fn verify_code(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyCodeRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("email and code are required"));
    };
    let email = normalize_email(&request.email);
    let code = request.code.trim().to_string();
    if email.is_empty() || code.is_empty() {
        return Err(AuthError::Validation("email and code are required"));
    }

    let ttl = auth_state.config().code_session_ttl_seconds();
    establish_session(
        &headers,
        &pool,
        &auth_state,
        ttl,
        Credential::Code { email, code },
    )
    .await
}

/// Shared verification kernel for both entry points.
///
/// Consumption and session creation run in a single transaction, so the
/// conditional `UPDATE` on the token row decides the winner under concurrent
/// redemption. A user with no tenant membership rolls back, leaving the token
/// unused for a retry after an invitation lands.
async fn establish_session(
    headers: &HeaderMap,
    pool: &PgPool,
    auth_state: &AuthState,
    ttl_seconds: i64,
    credential: Credential,
) -> Result<impl IntoResponse, AuthError> {
    let login_method = credential.login_method();
    let mut tx = pool.begin().await.map_err(AuthError::Database)?;

    let consumed = match &credential {
        Credential::Link { token, email } => consume_token_by_link(&mut tx, token, email).await?,
        Credential::Code { email, code } => consume_token_by_code(&mut tx, email, code).await?,
    };
    let Some(consumed) = consumed else {
        let _ = tx.rollback().await;
        return Err(AuthError::InvalidOrExpired);
    };

    // Pin the session to the token's tenant when the user belongs to it,
    // otherwise to the user's first membership.
    let tenant_id = match consumed.tenant_id {
        Some(tenant_id) if is_member(&mut tx, consumed.user_id, tenant_id).await? => {
            Some(tenant_id)
        }
        _ => first_membership(&mut tx, consumed.user_id).await?,
    };

    let Some(tenant_id) = tenant_id else {
        // Roll back so the token is not burned for a user who cannot log in yet.
        let _ = tx.rollback().await;
        return Err(AuthError::Forbidden("no_tenant"));
    };

    let session = insert_session(
        &mut tx,
        consumed.user_id,
        Some(tenant_id),
        ttl_seconds,
        extract_client_ip(headers).as_deref(),
        extract_user_agent(headers).as_deref(),
        login_method,
    )
    .await?;

    tx.commit().await.map_err(AuthError::Database)?;

    info!(
        user_id = %consumed.user_id,
        tenant_id = %tenant_id,
        login_method,
        "session created"
    );

    let cookie = session_cookie(auth_state.config(), &session.token, ttl_seconds)
        .map_err(|err| AuthError::Internal(err.into()))?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);

    let response = VerifyResponse {
        success: true,
        user: UserSummary {
            id: consumed.user_id.to_string(),
            email: consumed.email,
            name: consumed.name,
        },
    };
    Ok((response_headers, Json(response)))
}
