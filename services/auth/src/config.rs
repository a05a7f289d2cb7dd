use std::fmt::Display;
use std::ops::RangeInclusive;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::Deserialize;

use tessera_auth_types::token::{TokenLifetimes, TokenSecrets};
use tessera_core::config::Config;

use crate::usecase::elevation::ElevationPolicy;
use crate::usecase::passcode::PasscodePolicy;

/// Auth service configuration loaded from environment variables.
///
/// Field names map to upper-cased env vars (`PASSCODE_LENGTH`, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL (passcodes, elevation allow-list, expiry index).
    pub redis_url: String,
    /// HMAC secret for access tokens.
    pub access_token_secret: String,
    /// HMAC secret for refresh tokens.
    pub refresh_token_secret: String,
    /// HMAC secret for admin-elevation tokens.
    pub admin_token_secret: String,
    /// Hash the client must present to elevate.
    pub admin_password_hash: String,

    #[serde(default = "default_passcode_length")]
    pub passcode_length: usize,
    #[serde(default = "default_passcode_expiry_minutes")]
    pub passcode_expiry_minutes: i64,
    #[serde(default = "default_passcode_resend_cooldown_seconds")]
    pub passcode_resend_cooldown_seconds: i64,
    #[serde(default = "default_passcode_max_attempts")]
    pub passcode_max_attempts: u32,

    #[serde(default = "default_access_token_lifetime_minutes")]
    pub access_token_lifetime_minutes: i64,
    #[serde(default = "default_refresh_token_lifetime_days")]
    pub refresh_token_lifetime_days: i64,

    #[serde(default = "default_elevation_lifetime_minutes")]
    pub elevation_lifetime_minutes: i64,
    #[serde(default = "default_elevation_max_failed_attempts")]
    pub elevation_max_failed_attempts: u32,
    #[serde(default = "default_elevation_attempt_window_seconds")]
    pub elevation_attempt_window_seconds: u64,

    #[serde(default = "default_watcher_poll_interval_seconds")]
    pub watcher_poll_interval_seconds: u64,
    #[serde(default = "default_session_sweep_interval_minutes")]
    pub session_sweep_interval_minutes: u64,

    /// TCP port to listen on. Env var: `AUTH_PORT`.
    #[serde(default = "default_auth_port")]
    pub auth_port: u16,
}

impl Config for AuthConfig {}

/// A setting outside the range the service can run with.
#[derive(Debug, thiserror::Error)]
#[error("{field} must be within {range}, got {value}")]
pub struct ConfigError {
    pub field: &'static str,
    pub range: String,
    pub value: String,
}

fn check<T>(field: &'static str, value: T, range: RangeInclusive<T>) -> Result<(), ConfigError>
where
    T: PartialOrd + Display,
{
    if range.contains(&value) {
        return Ok(());
    }
    Err(ConfigError {
        field,
        range: format!("{}..={}", range.start(), range.end()),
        value: value.to_string(),
    })
}

fn default_passcode_length() -> usize {
    6
}
fn default_passcode_expiry_minutes() -> i64 {
    5
}
fn default_passcode_resend_cooldown_seconds() -> i64 {
    60
}
fn default_passcode_max_attempts() -> u32 {
    5
}
fn default_access_token_lifetime_minutes() -> i64 {
    15
}
fn default_refresh_token_lifetime_days() -> i64 {
    30
}
fn default_elevation_lifetime_minutes() -> i64 {
    15
}
fn default_elevation_max_failed_attempts() -> u32 {
    5
}
fn default_elevation_attempt_window_seconds() -> u64 {
    600
}
fn default_watcher_poll_interval_seconds() -> u64 {
    5
}
fn default_session_sweep_interval_minutes() -> u64 {
    60
}
fn default_auth_port() -> u16 {
    3112
}

impl AuthConfig {
    /// Reject values that would yield unusable codes, zero-length timers, or
    /// durations too large for chrono.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check("passcode_length", self.passcode_length, 4..=12)?;
        check("passcode_expiry_minutes", self.passcode_expiry_minutes, 1..=1_440)?;
        check(
            "passcode_resend_cooldown_seconds",
            self.passcode_resend_cooldown_seconds,
            0..=86_400,
        )?;
        check("passcode_max_attempts", self.passcode_max_attempts, 1..=u32::MAX)?;
        check(
            "access_token_lifetime_minutes",
            self.access_token_lifetime_minutes,
            1..=10_080,
        )?;
        check(
            "refresh_token_lifetime_days",
            self.refresh_token_lifetime_days,
            1..=3_650,
        )?;
        check(
            "elevation_lifetime_minutes",
            self.elevation_lifetime_minutes,
            1..=1_440,
        )?;
        check(
            "elevation_max_failed_attempts",
            self.elevation_max_failed_attempts,
            1..=u32::MAX,
        )?;
        check(
            "elevation_attempt_window_seconds",
            self.elevation_attempt_window_seconds,
            1..=604_800,
        )?;
        check(
            "watcher_poll_interval_seconds",
            self.watcher_poll_interval_seconds,
            1..=3_600,
        )?;
        check(
            "session_sweep_interval_minutes",
            self.session_sweep_interval_minutes,
            1..=10_080,
        )?;
        Ok(())
    }

    pub fn token_secrets(&self) -> TokenSecrets {
        TokenSecrets {
            access: self.access_token_secret.clone(),
            refresh: self.refresh_token_secret.clone(),
            admin: self.admin_token_secret.clone(),
        }
    }

    pub fn token_lifetimes(&self) -> TokenLifetimes {
        TokenLifetimes {
            access: Duration::minutes(self.access_token_lifetime_minutes),
            refresh: Duration::days(self.refresh_token_lifetime_days),
        }
    }

    pub fn passcode_policy(&self) -> PasscodePolicy {
        PasscodePolicy {
            length: self.passcode_length,
            expiry: Duration::minutes(self.passcode_expiry_minutes),
            resend_cooldown: Duration::seconds(self.passcode_resend_cooldown_seconds),
            max_attempts: self.passcode_max_attempts,
        }
    }

    pub fn elevation_policy(&self) -> ElevationPolicy {
        ElevationPolicy {
            lifetime: Duration::minutes(self.elevation_lifetime_minutes),
            admin_password_hash: self.admin_password_hash.clone(),
            max_failed_attempts: self.elevation_max_failed_attempts,
            attempt_window: StdDuration::from_secs(self.elevation_attempt_window_seconds),
        }
    }

    pub fn watcher_poll_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.watcher_poll_interval_seconds)
    }

    pub fn session_sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.session_sweep_interval_minutes.saturating_mul(60))
    }
}
