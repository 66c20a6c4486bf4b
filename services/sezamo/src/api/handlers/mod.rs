//! API handlers for Sezamo.
//!
//! Auth handlers own tokens and sessions; tenant handlers own membership,
//! branding and module entitlements; marketing is the representative gated
//! module surface.

pub mod auth;
pub mod health;
pub mod marketing;
pub mod root;
pub mod tenants;
