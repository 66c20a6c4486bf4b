use crate::api;
use anyhow::{Context, Result};
use std::{collections::HashMap, fs};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub magic_token_ttl_seconds: i64,
    pub link_session_ttl_seconds: i64,
    pub code_session_ttl_seconds: i64,
    pub cookie_secure: bool,
    pub auth_bypass: bool,
    pub default_brand_name: String,
    pub default_sender_email: String,
    pub dev_site_map_path: Option<String>,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if configuration files cannot be read or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let dev_sites: HashMap<String, String> = if let Some(path) = &args.dev_site_map_path {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read dev site map: {path}"))?;
        serde_json::from_str(&raw).with_context(|| format!("Invalid dev site map JSON: {path}"))?
    } else {
        HashMap::new()
    };

    if !dev_sites.is_empty() {
        debug!("Loaded {} dev site mappings", dev_sites.len());
    }

    let auth_config = api::handlers::auth::AuthConfig::new(args.frontend_base_url)
        .with_magic_token_ttl_seconds(args.magic_token_ttl_seconds)
        .with_link_session_ttl_seconds(args.link_session_ttl_seconds)
        .with_code_session_ttl_seconds(args.code_session_ttl_seconds)
        .with_cookie_secure(args.cookie_secure)
        .with_auth_bypass(args.auth_bypass)
        .with_default_branding(args.default_brand_name, args.default_sender_email)
        .with_dev_sites(dev_sites);

    let email_config = api::email::EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds);

    api::new(args.port, args.dsn, auth_config, email_config).await
}
