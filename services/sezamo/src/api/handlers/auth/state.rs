//! Auth configuration and shared request state.

use std::collections::HashMap;

const DEFAULT_MAGIC_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_LINK_SESSION_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_CODE_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_BRAND_NAME: &str = "Sezamo";
const DEFAULT_SENDER_EMAIL: &str = "no-reply@sezamo.dev";

/// Fallback branding used when no tenant site matches the requesting host.
/// Injected at startup so business logic never embeds brand literals.
#[derive(Clone, Debug)]
pub struct BrandingDefaults {
    pub brand_name: String,
    pub sender_email: String,
}

impl Default for BrandingDefaults {
    fn default() -> Self {
        Self {
            brand_name: DEFAULT_BRAND_NAME.to_string(),
            sender_email: DEFAULT_SENDER_EMAIL.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    magic_token_ttl_seconds: i64,
    link_session_ttl_seconds: i64,
    code_session_ttl_seconds: i64,
    cookie_secure: bool,
    auth_bypass: bool,
    branding: BrandingDefaults,
    /// Development-only remap of `host:port` to a production hostname.
    dev_sites: HashMap<String, String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            magic_token_ttl_seconds: DEFAULT_MAGIC_TOKEN_TTL_SECONDS,
            link_session_ttl_seconds: DEFAULT_LINK_SESSION_TTL_SECONDS,
            code_session_ttl_seconds: DEFAULT_CODE_SESSION_TTL_SECONDS,
            cookie_secure: false,
            auth_bypass: false,
            branding: BrandingDefaults::default(),
            dev_sites: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_magic_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.magic_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_link_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.link_session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_code_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_auth_bypass(mut self, bypass: bool) -> Self {
        self.auth_bypass = bypass;
        self
    }

    #[must_use]
    pub fn with_default_branding(mut self, brand_name: String, sender_email: String) -> Self {
        self.branding = BrandingDefaults {
            brand_name,
            sender_email,
        };
        self
    }

    #[must_use]
    pub fn with_dev_sites(mut self, dev_sites: HashMap<String, String>) -> Self {
        self.dev_sites = dev_sites;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn magic_token_ttl_seconds(&self) -> i64 {
        self.magic_token_ttl_seconds
    }

    pub(crate) fn link_session_ttl_seconds(&self) -> i64 {
        self.link_session_ttl_seconds
    }

    pub(crate) fn code_session_ttl_seconds(&self) -> i64 {
        self.code_session_ttl_seconds
    }

    /// Tenant switches share the lower-trust 7-day TTL of code sign-in.
    pub(crate) fn switch_session_ttl_seconds(&self) -> i64 {
        self.code_session_ttl_seconds
    }

    pub(crate) fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    pub(crate) fn auth_bypass(&self) -> bool {
        self.auth_bypass
    }

    pub(crate) fn branding(&self) -> &BrandingDefaults {
        &self.branding
    }

    pub(crate) fn dev_sites(&self) -> &HashMap<String, String> {
        &self.dev_sites
    }
}

/// Shared handler state carried via `Extension`.
pub struct AuthState {
    config: AuthConfig,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}
