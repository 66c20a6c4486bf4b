//! Magic-link authentication handlers.
//!
//! Sign-in is passwordless: the issuer mails a one-time link plus a 6-digit
//! fallback code, and the verifier exchanges either one for a session cookie.
//!
//! ## Token Invariants
//!
//! - At most one unused magic token per user: issuing a new link marks every
//!   prior unused token as used (soft-invalidated, never deleted).
//! - Consumption is a conditional `UPDATE ... WHERE used = FALSE AND
//!   expires_at > NOW()`, so concurrent redemption attempts resolve to exactly
//!   one winner.
//! - Only SHA-256 hashes of tokens, codes and session values are stored.
//!
//! ## Session Policy
//!
//! Link-based sign-in mints a 30-day session; code-based sign-in and tenant
//! switches mint 7-day sessions. The shorter TTL reflects the lower trust of
//! a hand-typed code and of mid-flight tenant changes.

pub mod error;
pub(crate) mod magic_link;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
pub mod types;
pub(crate) mod utils;
pub(crate) mod verify;

pub use state::{AuthConfig, AuthState, BrandingDefaults};
