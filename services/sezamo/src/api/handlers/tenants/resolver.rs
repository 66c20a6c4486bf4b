//! Per-request tenant branding resolution.
//!
//! The requesting site is taken from the `Origin` header (falling back to
//! `Referer`). In development the `host:port` can be remapped to a production
//! hostname via a static mapping loaded at startup. Resolution never fails:
//! unmapped hosts get the configured default branding.

use axum::http::{HeaderMap, header};
use sqlx::PgPool;
use tracing::debug;
use url::Url;

use crate::api::handlers::auth::AuthConfig;
use crate::api::handlers::auth::storage::Branding;

use super::storage::lookup_site;

/// Resolve branding for a magic-link issuance. Never fails: lookup errors
/// are logged and the defaults win.
pub(crate) async fn resolve_branding(
    pool: &PgPool,
    config: &AuthConfig,
    headers: &HeaderMap,
) -> Branding {
    let Some(host) = request_host(headers) else {
        return default_branding(config);
    };

    let host = config
        .dev_sites()
        .get(&host)
        .cloned()
        .unwrap_or(host);

    match lookup_site(pool, &host).await {
        Ok(Some(branding)) => branding,
        Ok(None) => {
            debug!(host = %host, "no tenant site for host, using default branding");
            default_branding(config)
        }
        Err(err) => {
            debug!(host = %host, "tenant site lookup failed, using default branding: {err}");
            default_branding(config)
        }
    }
}

fn default_branding(config: &AuthConfig) -> Branding {
    let defaults = config.branding();
    Branding {
        tenant_id: None,
        brand_name: defaults.brand_name.clone(),
        sender_email: defaults.sender_email.clone(),
    }
}

/// Extract `host[:port]` from the Origin header, falling back to Referer.
pub(crate) fn request_host(headers: &HeaderMap) -> Option<String> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .and_then(host_from_url);
    if origin.is_some() {
        return origin;
    }
    headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .and_then(host_from_url)
}

fn host_from_url(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}
