//! # Sezamo (Magic-Link Authentication & Tenant Sessions)
//!
//! `sezamo` is the authentication and session authority for multi-tenant
//! deployments. Users sign in by requesting a magic link; the service mails a
//! one-time URL plus a 6-digit fallback code, and exchanging either one mints
//! an opaque session cookie.
//!
//! ## Token Model
//!
//! - **Hash-only storage:** Raw link tokens, codes and session tokens never
//!   touch the database; only their SHA-256 hashes are persisted.
//! - **Single consumption:** Each magic link can be exchanged exactly once.
//!   Issuing a new link invalidates every prior unused one for the same user.
//! - **Soft-ended sessions:** Sessions are permanent audit records. Logout,
//!   tenant switches and expiry mark them inactive with an `end_reason`
//!   instead of deleting rows.
//!
//! ## Tenant Model
//!
//! Users can belong to multiple tenants. Each session is pinned to exactly
//! one tenant; switching tenants ends the current session and issues a fresh
//! cookie. Module entitlements (`marketing`, ...) are granted per tenant and
//! enforced by middleware before protected routes run.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
