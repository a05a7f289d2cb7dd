//! Long-running tasks owned by `main` and stopped on shutdown.

pub mod expiry_watcher;
pub mod session_sweep;
