//! Session and module-access gates.
//!
//! The session gate runs first and guarantees protected routes only execute
//! with an active, unexpired session. The module gate runs second and maps
//! path prefixes to module entitlements checked against the session's tenant.
//! Both redirect browsers instead of returning raw 401/403 pages.

use axum::{
    body::Body,
    extract::Extension,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error};
use url::form_urlencoded;

use crate::api::handlers::auth::session::{authenticate_session, extract_session_token};
use crate::api::handlers::auth::utils::hash_token;
use crate::api::handlers::auth::AuthState;
use crate::api::handlers::tenants::storage::has_module_access;

/// Path prefixes that never require a session.
const PUBLIC_PREFIXES: &[&str] = &["/auth/"];
const PUBLIC_PATHS: &[&str] = &["/", "/health", "/module-access-error"];

/// Static map of path prefixes to the module entitlement they require.
const MODULE_ROUTES: &[(&str, &str)] = &[("/marketing", "marketing")];

fn is_public_route(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn required_module(path: &str) -> Option<&'static str> {
    MODULE_ROUTES.iter().find_map(|(prefix, module)| {
        if path == *prefix || path.starts_with(&format!("{prefix}/")) {
            Some(*module)
        } else {
            None
        }
    })
}

fn login_redirect(original_path: &str) -> Response {
    let redirect: String =
        form_urlencoded::byte_serialize(original_path.as_bytes()).collect();
    Redirect::to(&format!("/auth/login?redirect={redirect}")).into_response()
}

fn module_error_redirect(module: &str, verification_failed: bool) -> Response {
    let mut target = format!("/module-access-error?module={module}");
    if verification_failed {
        target.push_str("&error=1");
    }
    Redirect::to(&target).into_response()
}

/// Require an active session for all non-public routes.
///
/// The development bypass flag skips the check entirely; it exists for local
/// frontend work and must never be set in production.
pub async fn session_gate(
    Extension(auth_state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if is_public_route(&path) || auth_state.config().auth_bypass() {
        return next.run(request).await;
    }

    match authenticate_session(request.headers(), &pool).await {
        Ok(Some(_)) => {
            // Refresh activity here rather than scattering updates through
            // the handlers. Lossy under race, which is fine.
            if let Some(token) = extract_session_token(request.headers()) {
                let session_hash = hash_token(&token);
                if let Err(err) =
                    crate::api::handlers::auth::storage::touch_session(&pool, &session_hash).await
                {
                    debug!("failed to refresh session activity: {err}");
                }
            }
            next.run(request).await
        }
        Ok(None) => login_redirect(&path),
        Err(err) => {
            error!("session gate lookup failed: {err}");
            login_redirect(&path)
        }
    }
}

/// Enforce module entitlements after the session gate.
///
/// Missing sessions redirect to login; entitlement denials and verification
/// failures redirect to the module-access error page, keeping the two
/// outcomes distinguishable for the frontend.
pub async fn module_gate(
    Extension(pool): Extension<PgPool>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let Some(module) = required_module(&path) else {
        return next.run(request).await;
    };

    let record = match authenticate_session(request.headers(), &pool).await {
        Ok(Some(record)) => record,
        Ok(None) => return login_redirect(&path),
        Err(err) => {
            error!("module gate session lookup failed: {err}");
            return login_redirect(&path);
        }
    };

    let Some(tenant_id) = record.tenant_id else {
        return module_error_redirect(module, false);
    };

    match has_module_access(&pool, tenant_id, module).await {
        Ok(true) => next.run(request).await,
        Ok(false) => module_error_redirect(module, false),
        Err(err) => {
            error!("module access check failed: {err}");
            module_error_redirect(module, true)
        }
    }
}
