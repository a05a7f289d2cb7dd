//! Credential types shared across Tessera services.
//!
//! Provides bearer-header parsing, typed JWT claims for the three token
//! categories (access, refresh, admin elevation) and their verification.
//! Signing is only compiled into the auth service (`USE_ONLY_IN_AUTH_SERVICE`).

pub mod bearer;
pub mod token;
