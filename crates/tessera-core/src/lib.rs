//! Shared service runtime for Tessera: env config, tracing, health probes,
//! request-id middleware, and serde helpers.

pub mod config;
pub mod health;
pub mod middleware;
pub mod serde;
pub mod tracing;
