//! Database helpers for tenant sites, membership, and module entitlements.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::api::handlers::auth::storage::Branding;

use super::types::TenantSummary;

/// Resolve a public hostname to its tenant branding, if a site row exists.
pub(crate) async fn lookup_site(pool: &PgPool, hostname: &str) -> Result<Option<Branding>> {
    let query = r"
        SELECT tenant_id, brand_name, sender_email
        FROM tenant_sites
        WHERE hostname = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(hostname)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup tenant site")?;

    Ok(row.map(|row| Branding {
        tenant_id: Some(row.get("tenant_id")),
        brand_name: row.get("brand_name"),
        sender_email: row.get("sender_email"),
    }))
}

/// Check membership inside the verification transaction.
pub(crate) async fn is_member(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    tenant_id: Uuid,
) -> Result<bool> {
    let query = r"
        SELECT 1 FROM tenant_members
        WHERE user_id = $1 AND tenant_id = $2
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to check tenant membership")?;
    Ok(row.is_some())
}

/// Earliest membership for a user, used when a token carries no tenant.
pub(crate) async fn first_membership(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<Option<Uuid>> {
    let query = r"
        SELECT tenant_id FROM tenant_members
        WHERE user_id = $1
        ORDER BY created_at ASC
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lookup first membership")?;
    Ok(row.map(|row| row.get("tenant_id")))
}

/// Look up a tenant by slug, but only if the user is a member.
pub(crate) async fn membership_by_slug(
    pool: &PgPool,
    user_id: Uuid,
    slug: &str,
) -> Result<Option<TenantSummary>> {
    let query = r"
        SELECT tenants.id, tenants.slug, tenants.name
        FROM tenants
        JOIN tenant_members ON tenant_members.tenant_id = tenants.id
        WHERE tenants.slug = $1 AND tenant_members.user_id = $2
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(slug)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup membership by slug")?;

    Ok(row.map(|row| TenantSummary {
        id: row.get::<Uuid, _>("id").to_string(),
        slug: row.get("slug"),
        name: row.get("name"),
    }))
}

/// Whether the tenant has been granted the named module.
pub(crate) async fn has_module_access(
    pool: &PgPool,
    tenant_id: Uuid,
    module_slug: &str,
) -> Result<bool> {
    let query = r"
        SELECT 1 FROM tenant_modules
        WHERE tenant_id = $1 AND module_slug = $2
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(tenant_id)
        .bind(module_slug)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check module access")?;
    Ok(row.is_some())
}
