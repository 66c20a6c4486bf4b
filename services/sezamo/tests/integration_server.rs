//! Integration tests for the Sezamo auth service.
//!
//! This suite verifies the full startup and login flow of the `sezamo`
//! binary by:
//! 1. Orchestrating a transient Postgres container and applying the schema.
//! 2. Spawning the actual `sezamo` binary as a supervised child process.
//! 3. Walking the magic-link flow end to end over real HTTP, reading the
//!    issued link and code back from the transactional email outbox.

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{StatusCode, header};
use serde_json::json;
use sqlx::{Connection, PgConnection, Row};
use std::{
    net::TcpListener,
    process::{Child, Command, Stdio},
    time::Duration,
};
use test_support::{TestNetwork, postgres::PostgresContainer, runtime};
use tokio::time::sleep;
use uuid::Uuid;

const SEZAMO_SCHEMA_SQL: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const SESSION_COOKIE_NAME: &str = "session-token";

struct ChildGuard(Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

struct TestContext {
    _postgres: PostgresContainer,
    port: u16,
    dsn: String,
}

impl TestContext {
    async fn new() -> Result<Self> {
        let network = TestNetwork::new("sezamo-it");

        let postgres = PostgresContainer::start(network.name()).await?;
        postgres.wait_until_ready().await?;

        let mut connection = PgConnection::connect(&postgres.admin_dsn())
            .await
            .context("Failed to connect for schema setup")?;
        apply_schema(&mut connection, SEZAMO_SCHEMA_SQL).await?;

        let dsn = postgres.admin_dsn();

        Ok(Self {
            _postgres: postgres,
            port: pick_port()?,
            dsn,
        })
    }

    async fn connect(&self) -> Result<PgConnection> {
        PgConnection::connect(&self.dsn)
            .await
            .context("Failed to connect to test database")
    }
}

async fn apply_schema(connection: &mut PgConnection, sql: &str) -> Result<()> {
    for (index, statement) in split_sql_statements(sql).iter().enumerate() {
        sqlx::query(statement)
            .execute(&mut *connection)
            .await
            .with_context(|| format!("Failed to execute schema statement {}", index + 1))?;
    }
    Ok(())
}

fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with(r"\ir ") {
            continue;
        }
        current.push_str(line);
        current.push('\n');

        if trimmed.ends_with(';') {
            let statement = current.trim();
            if !statement.is_empty() {
                statements.push(statement.to_string());
            }
            current.clear();
        }
    }

    let leftover = current.trim();
    if !leftover.is_empty() {
        statements.push(leftover.to_string());
    }

    statements
}

fn pick_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("Failed to bind a local port")?;
    Ok(listener
        .local_addr()
        .context("Failed to read local port")?
        .port())
}

fn spawn_server(ctx: &TestContext) -> Result<ChildGuard> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_sezamo"));
    command.env("SEZAMO_LOG_LEVEL", "debug");
    command.env_remove("SEZAMO_COOKIE_SECURE");
    command.env_remove("SEZAMO_AUTH_BYPASS");

    let child = command
        .args([
            "--port",
            &ctx.port.to_string(),
            "--dsn",
            &ctx.dsn,
            "--frontend-base-url",
            "http://localhost:3000",
            "--email-outbox-poll-seconds",
            "1",
        ])
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .context("Failed to spawn sezamo binary")?;

    Ok(ChildGuard(child))
}

async fn wait_for_ready(client: &reqwest::Client, base: &str) -> Result<()> {
    for _ in 0..40 {
        match client.get(format!("{base}/health")).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => sleep(Duration::from_millis(250)).await,
        }
    }
    bail!("sezamo did not become ready at {base}");
}

async fn seed_tenant(
    connection: &mut PgConnection,
    slug: &str,
    name: &str,
) -> Result<Uuid> {
    let row = sqlx::query("INSERT INTO tenants (slug, name) VALUES ($1, $2) RETURNING id")
        .bind(slug)
        .bind(name)
        .fetch_one(&mut *connection)
        .await
        .context("Failed to insert tenant")?;
    Ok(row.get("id"))
}

async fn seed_membership(
    connection: &mut PgConnection,
    tenant_id: Uuid,
    email: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO tenant_members (tenant_id, user_id)
         SELECT $1, id FROM users WHERE email = $2",
    )
    .bind(tenant_id)
    .bind(email)
    .execute(&mut *connection)
    .await
    .context("Failed to insert membership")?;
    Ok(())
}

/// Pull the raw link token and code out of the latest outbox payload.
async fn latest_magic_credentials(
    connection: &mut PgConnection,
    email: &str,
) -> Result<(String, String)> {
    let row = sqlx::query(
        "SELECT payload_json->>'magic_url' AS magic_url, payload_json->>'code' AS code
         FROM email_outbox WHERE to_email = $1
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(email)
    .fetch_one(&mut *connection)
    .await
    .context("Failed to read outbox row")?;

    let magic_url: String = row.get("magic_url");
    let code: String = row.get("code");

    let parsed = url::Url::parse(&magic_url).context("Failed to parse magic URL")?;
    let token = parsed
        .query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| anyhow!("magic URL missing token parameter"))?;

    Ok((token, code))
}

fn session_cookie_from(resp: &reqwest::Response) -> Result<String> {
    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| anyhow!("missing Set-Cookie header"))?;
    let pair = cookie
        .split(';')
        .next()
        .ok_or_else(|| anyhow!("empty cookie"))?;
    if !pair.starts_with(SESSION_COOKIE_NAME) {
        bail!("unexpected cookie: {pair}");
    }
    Ok(pair.to_string())
}

#[tokio::test]
async fn magic_link_login_flow() -> Result<()> {
    if let Err(err) = runtime::ensure_container_runtime() {
        eprintln!("Skipping integration test: {err}");
        return Ok(());
    }

    let ctx = TestContext::new().await?;
    let base = format!("http://127.0.0.1:{}", ctx.port);
    let _child = spawn_server(&ctx)?;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    wait_for_ready(&client, &base).await?;

    let email = "owner@example.com";

    // Request a magic link; the user row is created on first contact.
    let resp = client
        .post(format!("{base}/auth/magic-link"))
        .json(&json!({ "email": email }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Membership is granted after issuance; the token must still redeem.
    let mut connection = ctx.connect().await?;
    let home = seed_tenant(&mut connection, "home", "Home Tenant").await?;
    let away = seed_tenant(&mut connection, "away", "Away Tenant").await?;
    seed_membership(&mut connection, home, email).await?;
    // Separate the join timestamps so the default tenant is deterministic.
    sqlx::query("UPDATE tenant_members SET created_at = created_at - INTERVAL '1 hour'")
        .execute(&mut connection)
        .await?;
    seed_membership(&mut connection, away, email).await?;

    let (token, _code) = latest_magic_credentials(&mut connection, email).await?;

    // Redeem the link for a session cookie.
    let resp = client
        .post(format!("{base}/auth/verify"))
        .json(&json!({ "token": token, "email": email }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = session_cookie_from(&resp)?;

    // The same link is burned now.
    let resp = client
        .post(format!("{base}/auth/verify"))
        .json(&json!({ "token": token, "email": email }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // The session endpoint resolves the cookie to the user and first tenant.
    let resp = client
        .get(format!("{base}/auth/session"))
        .header(header::COOKIE, &cookie)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["user"]["email"], email);
    assert_eq!(body["session"]["tenant_slug"], "home");
    assert_eq!(body["session"]["login_method"], "magic_link");

    // Switching tenants rotates the cookie.
    let resp = client
        .post(format!("{base}/auth/switch-tenant"))
        .header(header::COOKIE, &cookie)
        .json(&json!({ "tenantSlug": "away" }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let switched_cookie = session_cookie_from(&resp)?;
    assert_ne!(switched_cookie, cookie);

    // The pre-switch cookie is dead.
    let resp = client
        .get(format!("{base}/auth/session"))
        .header(header::COOKIE, &cookie)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Module routes bounce sessions whose tenant lacks the entitlement.
    let resp = client
        .get(format!("{base}/marketing/overview"))
        .header(header::COOKIE, &switched_cookie)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let location = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(location.starts_with("/module-access-error?module=marketing"));

    sqlx::query("INSERT INTO tenant_modules (tenant_id, module_slug) VALUES ($1, 'marketing')")
        .bind(away)
        .execute(&mut connection)
        .await?;

    let resp = client
        .get(format!("{base}/marketing/overview"))
        .header(header::COOKIE, &switched_cookie)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // Signing out clears the session for good.
    let resp = client
        .post(format!("{base}/auth/signout"))
        .header(header::COOKIE, &switched_cookie)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{base}/auth/session"))
        .header(header::COOKIE, &switched_cookie)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn code_login_and_gate_redirects() -> Result<()> {
    if let Err(err) = runtime::ensure_container_runtime() {
        eprintln!("Skipping integration test: {err}");
        return Ok(());
    }

    let ctx = TestContext::new().await?;
    let base = format!("http://127.0.0.1:{}", ctx.port);
    let _child = spawn_server(&ctx)?;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    wait_for_ready(&client, &base).await?;

    // An anonymous hit on a protected route bounces to the login page.
    let resp = client.get(format!("{base}/marketing/overview")).send().await?;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let location = resp
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(location.starts_with("/auth/login?redirect="));

    let email = "coder@example.com";
    let resp = client
        .post(format!("{base}/auth/magic-link"))
        .json(&json!({ "email": email }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let mut connection = ctx.connect().await?;
    let tenant = seed_tenant(&mut connection, "solo", "Solo Tenant").await?;
    seed_membership(&mut connection, tenant, email).await?;

    let (_token, code) = latest_magic_credentials(&mut connection, email).await?;

    // A wrong code never creates a session.
    let wrong = if code == "000000" { "000001" } else { "000000" };
    let resp = client
        .post(format!("{base}/auth/verify-code"))
        .json(&json!({ "email": email, "code": wrong }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .post(format!("{base}/auth/verify-code"))
        .json(&json!({ "email": email, "code": code }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = session_cookie_from(&resp)?;

    let resp = client
        .get(format!("{base}/auth/session"))
        .header(header::COOKIE, &cookie)
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["session"]["login_method"], "code");
    assert_eq!(body["session"]["tenant_slug"], "solo");

    Ok(())
}
