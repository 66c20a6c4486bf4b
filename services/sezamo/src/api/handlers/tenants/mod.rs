//! Tenant switching and module entitlement endpoints.

pub(crate) mod resolver;
pub(crate) mod storage;
pub mod types;


use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, header::SET_COOKIE},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use super::auth::error::AuthError;
use super::auth::session::{authenticate_session, extract_session_token, session_cookie};
use super::auth::storage::insert_session;
use super::auth::utils::hash_token;
use super::auth::AuthState;
use storage::{has_module_access, membership_by_slug};
use types::{
    CheckModuleAccessRequest, CheckModuleAccessResponse, SwitchTenantRequest, SwitchTenantResponse,
};

/// Re-scope the current session to another tenant the user belongs to.
///
/// The old session is ended with `end_reason = 'tenant_switch'` and a fresh
/// 7-day session is minted carrying over the client metadata. Denied switches
/// leave the current session untouched.
#[utoipa::path(
    post,
    path = "/auth/switch-tenant",
    request_body = SwitchTenantRequest,
    responses(
        (status = 200, description = "Session re-scoped to the new tenant", body = SwitchTenantResponse),
        (status = 401, description = "No active session"),
        (status = 403, description = "Not a member of the target tenant")
    ),
    tag = "tenants"
)]
pub async fn switch_tenant(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SwitchTenantRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("tenantSlug is required"));
    };
    let slug = request.tenant_slug.trim();
    if slug.is_empty() {
        return Err(AuthError::Validation("tenantSlug is required"));
    }

    let record = authenticate_session(&headers, &pool)
        .await
        .map_err(|_| AuthError::Internal(anyhow::anyhow!("session lookup failed")))?
        .ok_or(AuthError::NoSession)?;

    // Membership is checked before anything is ended, so a denied switch is
    // a pure no-op.
    let Some(tenant) = membership_by_slug(&pool, record.user_id, slug).await? else {
        return Err(AuthError::Forbidden("access_denied"));
    };

    let Some(old_token) = extract_session_token(&headers) else {
        return Err(AuthError::NoSession);
    };
    let old_hash = hash_token(&old_token);
    let tenant_id = tenant
        .id
        .parse::<uuid::Uuid>()
        .map_err(|err| AuthError::Internal(err.into()))?;

    let ttl = auth_state.config().switch_session_ttl_seconds();
    let mut tx = pool.begin().await.map_err(AuthError::Database)?;
    super::auth::storage::end_session(&mut tx, &old_hash, "tenant_switch").await?;
    let session = insert_session(
        &mut tx,
        record.user_id,
        Some(tenant_id),
        ttl,
        record.ip_address.as_deref(),
        record.user_agent.as_deref(),
        &record.login_method,
    )
    .await?;
    tx.commit().await.map_err(AuthError::Database)?;

    info!(
        user_id = %record.user_id,
        tenant_slug = %tenant.slug,
        "tenant switched"
    );

    let cookie = session_cookie(auth_state.config(), &session.token, ttl)
        .map_err(|err| AuthError::Internal(err.into()))?;
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);

    let response = SwitchTenantResponse {
        success: true,
        tenant,
        timestamp: session.created_at,
    };
    Ok((response_headers, Json(response)))
}

/// Report whether the session's tenant holds the named module entitlement.
/// Called server-side by the module-access gate; sessions without a tenant
/// never have access.
#[utoipa::path(
    post,
    path = "/auth/check-module-access",
    request_body = CheckModuleAccessRequest,
    responses(
        (status = 200, description = "Entitlement decision", body = CheckModuleAccessResponse),
        (status = 401, description = "No active session")
    ),
    tag = "tenants"
)]
pub async fn check_module_access(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    payload: Option<Json<CheckModuleAccessRequest>>,
) -> Result<impl IntoResponse, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("module_slug is required"));
    };
    let module_slug = request.module_slug.trim();
    if module_slug.is_empty() {
        return Err(AuthError::Validation("module_slug is required"));
    }

    let record = authenticate_session(&headers, &pool)
        .await
        .map_err(|_| AuthError::Internal(anyhow::anyhow!("session lookup failed")))?
        .ok_or(AuthError::NoSession)?;

    let has_access = match record.tenant_id {
        Some(tenant_id) => has_module_access(&pool, tenant_id, module_slug).await?,
        None => false,
    };

    Ok(Json(CheckModuleAccessResponse {
        success: true,
        has_access,
    }))
}
