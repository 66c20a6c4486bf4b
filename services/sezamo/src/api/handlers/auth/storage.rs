//! Database helpers for magic tokens and sessions.

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::state::AuthConfig;
use crate::api::email::{MAGIC_LINK_TEMPLATE, MagicLinkEmail};
use super::utils::{
    build_magic_link, generate_link_token, generate_session_token, generate_verification_code,
    hash_token, is_unique_violation,
};

/// Branding resolved for one issuance; owned by the tenants resolver.
pub(crate) struct Branding {
    pub(crate) tenant_id: Option<Uuid>,
    pub(crate) brand_name: String,
    pub(crate) sender_email: String,
}

/// Fields returned when a token or code is consumed.
pub(crate) struct ConsumedToken {
    pub(crate) user_id: Uuid,
    pub(crate) tenant_id: Option<Uuid>,
    pub(crate) email: String,
    pub(crate) name: String,
}

/// A freshly minted session. The raw token only exists here and in the cookie.
pub(crate) struct NewSession {
    pub(crate) token: String,
    pub(crate) created_at: String,
    pub(crate) expires_at: String,
}

/// Session data joined with user and tenant rows for a valid cookie.
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) email: String,
    pub(crate) name: String,
    pub(crate) tenant_id: Option<Uuid>,
    pub(crate) tenant_slug: Option<String>,
    pub(crate) created_at: String,
    pub(crate) expires_at: String,
    pub(crate) login_method: String,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
}

const TIMESTAMP_FORMAT: &str = r#"YYYY-MM-DD"T"HH24:MI:SS"Z""#;

/// Find a user by email or create one with a placeholder profile.
/// The placeholder name is the local part of the address.
///
/// The `DO UPDATE` arm takes a row lock on the existing user, so concurrent
/// issuances for one address serialize here before `invalidate_unused_tokens`
/// runs. Switching to `DO NOTHING` plus a select would lose that lock and let
/// two unused tokens coexist.
pub(crate) async fn find_or_create_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    email: &str,
) -> Result<Uuid> {
    let query = r"
        INSERT INTO users (email, name)
        VALUES ($1, split_part($1, '@', 1))
        ON CONFLICT (email) DO UPDATE SET updated_at = NOW()
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to find or create user")?;
    Ok(row.get("id"))
}

/// Soft-invalidate every unused token for a user before issuing a new one.
/// Rows are kept for analytics; only the `used` flag changes.
pub(super) async fn invalidate_unused_tokens(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<u64> {
    let query = r"
        UPDATE magic_tokens
        SET used = TRUE, used_at = NOW()
        WHERE user_id = $1 AND used = FALSE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to invalidate unused tokens")?;
    Ok(result.rows_affected())
}

/// Persist a new magic token and enqueue the branded email in one transaction.
/// Returns the raw link token so callers can log its prefix for correlation.
pub(crate) async fn issue_magic_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    email: &str,
    redirect: Option<&str>,
    branding: &Branding,
    config: &AuthConfig,
) -> Result<String> {
    let token = generate_link_token()?;
    let code = generate_verification_code();
    let token_hash = hash_token(&token);
    let code_hash = hash_token(&code);

    let query = r"
        INSERT INTO magic_tokens
            (user_id, token_hash, code_hash, tenant_id, expires_at)
        VALUES ($1, $2, $3, $4, NOW() + ($5 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(code_hash)
        .bind(branding.tenant_id)
        .bind(config.magic_token_ttl_seconds())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert magic token")?;

    let magic_url = build_magic_link(config.frontend_base_url(), &token, email, redirect);
    let mail = MagicLinkEmail {
        email: email.to_string(),
        brand_name: branding.brand_name.clone(),
        sender_email: branding.sender_email.clone(),
        magic_url,
        code,
    };
    let payload_text =
        serde_json::to_string(&mail).context("failed to serialize email payload")?;

    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(MAGIC_LINK_TEMPLATE)
        .bind(payload_text)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;

    Ok(token)
}

/// Consume a magic token by link token and email.
///
/// The conditional `UPDATE` is the single synchronization point: of two
/// concurrent redemptions only one sees `used = FALSE` and wins.
pub(super) async fn consume_token_by_link(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token: &str,
    email: &str,
) -> Result<Option<ConsumedToken>> {
    let token_hash = hash_token(token);
    let query = r"
        UPDATE magic_tokens
        SET used = TRUE, used_at = NOW()
        FROM users
        WHERE magic_tokens.user_id = users.id
          AND magic_tokens.token_hash = $1
          AND users.email = $2
          AND magic_tokens.used = FALSE
          AND magic_tokens.expires_at > NOW()
        RETURNING users.id AS user_id, magic_tokens.tenant_id, users.email, users.name
    ";
    consume_token(tx, query, &token_hash, email).await
}

/// Consume a magic token by email and 6-digit code.
pub(super) async fn consume_token_by_code(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    email: &str,
    code: &str,
) -> Result<Option<ConsumedToken>> {
    let code_hash = hash_token(code);
    let query = r"
        UPDATE magic_tokens
        SET used = TRUE, used_at = NOW()
        FROM users
        WHERE magic_tokens.user_id = users.id
          AND magic_tokens.code_hash = $1
          AND users.email = $2
          AND magic_tokens.used = FALSE
          AND magic_tokens.expires_at > NOW()
        RETURNING users.id AS user_id, magic_tokens.tenant_id, users.email, users.name
    ";
    consume_token(tx, query, &code_hash, email).await
}

async fn consume_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    query: &str,
    secret_hash: &[u8],
    email: &str,
) -> Result<Option<ConsumedToken>> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(secret_hash)
        .bind(email)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume magic token")?;

    Ok(row.map(|row| ConsumedToken {
        user_id: row.get("user_id"),
        tenant_id: row.get("tenant_id"),
        email: row.get("email"),
        name: row.get("name"),
    }))
}

/// Insert a session row and return the raw token for the cookie.
/// Retries on session_hash collisions, which should be vanishingly rare.
pub(crate) async fn insert_session(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    tenant_id: Option<Uuid>,
    ttl_seconds: i64,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
    login_method: &str,
) -> Result<NewSession> {
    let query = format!(
        r"
        INSERT INTO sessions
            (user_id, tenant_id, session_hash, expires_at, ip_address, user_agent, login_method)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'), $5, $6, $7)
        RETURNING
            to_char(created_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS created_at,
            to_char(expires_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS expires_at
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let session_hash = hash_token(&token);
        let result = sqlx::query(&query)
            .bind(user_id)
            .bind(tenant_id)
            .bind(session_hash)
            .bind(ttl_seconds)
            .bind(ip_address)
            .bind(user_agent)
            .bind(login_method)
            .fetch_one(&mut **tx)
            .instrument(span.clone())
            .await;

        match result {
            Ok(row) => {
                return Ok(NewSession {
                    token,
                    created_at: row.get("created_at"),
                    expires_at: row.get("expires_at"),
                });
            }
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

/// Resolve a session hash to its record, lazily expiring stale rows first.
///
/// The expiry `UPDATE` turns rows past their `expires_at` into ended audit
/// records with `end_reason = 'expired'`, so the subsequent read only ever
/// returns sessions that are both active and unexpired.
pub(crate) async fn lookup_session(
    pool: &PgPool,
    session_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = r"
        UPDATE sessions
        SET is_active = FALSE, ended_at = NOW(), end_reason = 'expired'
        WHERE session_hash = $1
          AND is_active = TRUE
          AND expires_at <= NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to expire stale session")?;

    let query = format!(
        r"
        SELECT users.id AS user_id, users.email, users.name,
               sessions.tenant_id, tenants.slug AS tenant_slug,
               to_char(sessions.created_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS created_at,
               to_char(sessions.expires_at AT TIME ZONE 'utc', '{TIMESTAMP_FORMAT}') AS expires_at,
               sessions.login_method, sessions.ip_address, sessions.user_agent
        FROM sessions
        JOIN users ON users.id = sessions.user_id
        LEFT JOIN tenants ON tenants.id = sessions.tenant_id
        WHERE sessions.session_hash = $1
          AND sessions.is_active = TRUE
          AND sessions.expires_at > NOW()
        LIMIT 1
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(session_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    Ok(row.map(|row| SessionRecord {
        user_id: row.get("user_id"),
        email: row.get("email"),
        name: row.get("name"),
        tenant_id: row.get("tenant_id"),
        tenant_slug: row.get("tenant_slug"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        login_method: row.get("login_method"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
    }))
}

/// Refresh the activity timestamp without extending the session TTL.
/// Best-effort: lost updates under race are acceptable.
pub(crate) async fn touch_session(pool: &PgPool, session_hash: &[u8]) -> Result<()> {
    let query = r"
        UPDATE sessions
        SET last_activity_at = NOW()
        WHERE session_hash = $1 AND is_active = TRUE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to touch session")?;
    Ok(())
}

/// End a session with the given reason. Returns whether a row transitioned.
/// Ended sessions stay in the table as permanent audit records.
pub(crate) async fn end_session(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    session_hash: &[u8],
    reason: &str,
) -> Result<bool> {
    let query = r"
        UPDATE sessions
        SET is_active = FALSE, ended_at = NOW(), end_reason = $2
        WHERE session_hash = $1 AND is_active = TRUE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(session_hash)
        .bind(reason)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to end session")?;
    Ok(result.rows_affected() > 0)
}
