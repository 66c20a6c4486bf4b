//! Magic link issuance endpoint.

use axum::{
    Json,
    extract::Extension,
    http::HeaderMap,
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::api::handlers::tenants::resolver::resolve_branding;

use super::error::AuthError;
use super::state::AuthState;
use super::storage::{find_or_create_user, invalidate_unused_tokens, issue_magic_token};
use super::types::{MagicLinkRequest, MagicLinkResponse};
use super::utils::{normalize_email, token_prefix, valid_email};

/// Issue a magic link and fallback code for the given email.
///
/// The user row, token row, prior-token invalidation, and outbox row all
/// commit in one transaction. The response never carries the token or code;
/// both are delivered only through the email channel.
#[utoipa::path(
    post,
    path = "/auth/magic-link",
    request_body = MagicLinkRequest,
    responses(
        (status = 200, description = "Magic link queued", body = MagicLinkResponse),
        (status = 400, description = "Missing or invalid email")
    ),
    tag = "auth"
)]
pub async fn magic_link(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<MagicLinkRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("email is required"));
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthError::Validation("email is required"));
    }

    // Branding resolution never fails the request; unmapped hosts fall back
    // to the configured defaults.
    let branding = resolve_branding(&pool, auth_state.config(), &headers).await;

    let mut tx = pool.begin().await.map_err(AuthError::Database)?;

    let user_id = find_or_create_user(&mut tx, &email).await?;
    let invalidated = invalidate_unused_tokens(&mut tx, user_id).await?;
    let token = issue_magic_token(
        &mut tx,
        user_id,
        &email,
        request.redirect.as_deref(),
        &branding,
        auth_state.config(),
    )
    .await?;

    tx.commit().await.map_err(AuthError::Database)?;

    info!(
        user_id = %user_id,
        token_prefix = token_prefix(&token),
        invalidated,
        brand = %branding.brand_name,
        "magic link issued"
    );

    Ok(Json(MagicLinkResponse { success: true }))
}
