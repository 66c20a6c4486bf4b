use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};

pub fn with_args(command: Command) -> Command {
    let command = with_link_args(command);
    let command = with_session_args(command);
    let command = with_branding_args(command);
    with_outbox_args(command)
}

fn with_link_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for magic links")
                .env("SEZAMO_FRONTEND_BASE_URL")
                .default_value("https://sezamo.dev"),
        )
        .arg(
            Arg::new("magic-token-ttl-seconds")
                .long("magic-token-ttl-seconds")
                .help("Magic link and code TTL in seconds")
                .env("SEZAMO_MAGIC_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("link-session-ttl-seconds")
                .long("link-session-ttl-seconds")
                .help("Session TTL for link-based sign-in in seconds")
                .env("SEZAMO_LINK_SESSION_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("code-session-ttl-seconds")
                .long("code-session-ttl-seconds")
                .help("Session TTL for code-based sign-in and tenant switches in seconds")
                .env("SEZAMO_CODE_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("cookie-secure")
                .long("cookie-secure")
                .help("Mark the session cookie as Secure (HTTPS only)")
                .env("SEZAMO_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("auth-bypass")
                .long("auth-bypass")
                .help("Disable the session gate (local development only)")
                .env("SEZAMO_AUTH_BYPASS")
                .action(ArgAction::SetTrue),
        )
}

fn with_branding_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("default-brand-name")
                .long("default-brand-name")
                .help("Brand name used when no tenant site matches the request host")
                .env("SEZAMO_DEFAULT_BRAND_NAME")
                .default_value("Sezamo"),
        )
        .arg(
            Arg::new("default-sender-email")
                .long("default-sender-email")
                .help("Sender address used when no tenant site matches the request host")
                .env("SEZAMO_DEFAULT_SENDER_EMAIL")
                .default_value("no-reply@sezamo.dev"),
        )
        .arg(
            Arg::new("dev-site-map")
                .long("dev-site-map")
                .help("Path to a JSON file mapping development hostnames to production hostnames")
                .env("SEZAMO_DEV_SITE_MAP"),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("SEZAMO_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("SEZAMO_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("SEZAMO_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("SEZAMO_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("SEZAMO_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub magic_token_ttl_seconds: i64,
    pub link_session_ttl_seconds: i64,
    pub code_session_ttl_seconds: i64,
    pub cookie_secure: bool,
    pub auth_bypass: bool,
    pub default_brand_name: String,
    pub default_sender_email: String,
    pub dev_site_map: Option<String>,
    pub email_outbox: OutboxOptions,
}

impl Options {
    /// Collect auth-related arguments from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is missing, which indicates a
    /// wiring bug in the command definition.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>("frontend-base-url")
            .cloned()
            .context("missing argument: --frontend-base-url")?;
        let magic_token_ttl_seconds = matches
            .get_one::<i64>("magic-token-ttl-seconds")
            .copied()
            .context("missing argument: --magic-token-ttl-seconds")?;
        let link_session_ttl_seconds = matches
            .get_one::<i64>("link-session-ttl-seconds")
            .copied()
            .context("missing argument: --link-session-ttl-seconds")?;
        let code_session_ttl_seconds = matches
            .get_one::<i64>("code-session-ttl-seconds")
            .copied()
            .context("missing argument: --code-session-ttl-seconds")?;
        let default_brand_name = matches
            .get_one::<String>("default-brand-name")
            .cloned()
            .context("missing argument: --default-brand-name")?;
        let default_sender_email = matches
            .get_one::<String>("default-sender-email")
            .cloned()
            .context("missing argument: --default-sender-email")?;

        let email_outbox = OutboxOptions {
            poll_seconds: matches
                .get_one::<u64>("email-outbox-poll-seconds")
                .copied()
                .context("missing argument: --email-outbox-poll-seconds")?,
            batch_size: matches
                .get_one::<usize>("email-outbox-batch-size")
                .copied()
                .context("missing argument: --email-outbox-batch-size")?,
            max_attempts: matches
                .get_one::<u32>("email-outbox-max-attempts")
                .copied()
                .context("missing argument: --email-outbox-max-attempts")?,
            backoff_base_seconds: matches
                .get_one::<u64>("email-outbox-backoff-base-seconds")
                .copied()
                .context("missing argument: --email-outbox-backoff-base-seconds")?,
            backoff_max_seconds: matches
                .get_one::<u64>("email-outbox-backoff-max-seconds")
                .copied()
                .context("missing argument: --email-outbox-backoff-max-seconds")?,
        };

        Ok(Self {
            frontend_base_url,
            magic_token_ttl_seconds,
            link_session_ttl_seconds,
            code_session_ttl_seconds,
            cookie_secure: matches.get_flag("cookie-secure"),
            auth_bypass: matches.get_flag("auth-bypass"),
            default_brand_name,
            default_sender_email,
            dev_site_map: matches.get_one::<String>("dev-site-map").cloned(),
            email_outbox,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() -> Result<()> {
        temp_env::with_vars(
            [
                ("SEZAMO_COOKIE_SECURE", None::<&str>),
                ("SEZAMO_AUTH_BYPASS", None::<&str>),
                ("SEZAMO_DEV_SITE_MAP", None::<&str>),
            ],
            || -> Result<()> {
                let command = crate::cli::commands::new();
                let matches =
                    command.get_matches_from(vec!["sezamo", "--dsn", "postgres://localhost"]);
                let options = Options::parse(&matches)?;

                assert_eq!(options.frontend_base_url, "https://sezamo.dev");
                assert_eq!(options.magic_token_ttl_seconds, 900);
                assert_eq!(options.link_session_ttl_seconds, 2_592_000);
                assert_eq!(options.code_session_ttl_seconds, 604_800);
                assert!(!options.cookie_secure);
                assert!(!options.auth_bypass);
                assert_eq!(options.default_brand_name, "Sezamo");
                assert_eq!(options.default_sender_email, "no-reply@sezamo.dev");
                assert_eq!(options.dev_site_map, None);
                assert_eq!(options.email_outbox.poll_seconds, 5);
                assert_eq!(options.email_outbox.batch_size, 10);
                assert_eq!(options.email_outbox.max_attempts, 5);
                Ok(())
            },
        )
    }

    #[test]
    fn test_parse_overrides() -> Result<()> {
        let command = crate::cli::commands::new();
        let matches = command.get_matches_from(vec![
            "sezamo",
            "--dsn",
            "postgres://localhost",
            "--frontend-base-url",
            "https://app.example.com",
            "--magic-token-ttl-seconds",
            "300",
            "--cookie-secure",
            "--dev-site-map",
            "/etc/sezamo/dev-sites.json",
        ]);
        let options = Options::parse(&matches)?;

        assert_eq!(options.frontend_base_url, "https://app.example.com");
        assert_eq!(options.magic_token_ttl_seconds, 300);
        assert!(options.cookie_secure);
        assert_eq!(
            options.dev_site_map.as_deref(),
            Some("/etc/sezamo/dev-sites.json")
        );
        Ok(())
    }
}
