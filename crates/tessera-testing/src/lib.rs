//! Test utilities for Tessera services.
//!
//! Provides a deterministic token signer, auth header builders and small HTTP
//! helpers for driving routers in-process.
//! Import in `#[cfg(test)]` blocks and `tests/` only, never in production code.

pub mod auth;
pub mod http;
