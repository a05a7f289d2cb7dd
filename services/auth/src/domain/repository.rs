#![allow(async_fn_in_trait)]

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::types::{
    AuthUser, ElevationRecord, ExpiryMember, GrantOutcome, JtiElevationEntry, PasscodeRecord,
    SessionRecord, UserElevationEntry,
};
use crate::error::AuthServiceError;

// The expiry watcher runs these ports inside `tokio::spawn`, so their futures
// must be `Send` even when the watcher is generic over the implementation.

/// Users and their admin elevation pointer.
pub trait UserRepository: Send + Sync {
    fn find_by_id(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<AuthUser>, AuthServiceError>> + Send;

    /// Look up by (normalized) email, inserting a fresh user on first login.
    fn find_or_create_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthServiceError>> + Send;
}

/// Per-email passcode records in the shared TTL store.
pub trait PasscodeStore: Send + Sync {
    async fn get(&self, email: &str) -> Result<Option<PasscodeRecord>, AuthServiceError>;

    /// Overwrite the record with the given time-to-live.
    async fn put(
        &self,
        email: &str,
        record: &PasscodeRecord,
        ttl: Duration,
    ) -> Result<(), AuthServiceError>;

    /// Store the record only if no record exists. Returns `false` when one does.
    async fn put_if_absent(
        &self,
        email: &str,
        record: &PasscodeRecord,
        ttl: Duration,
    ) -> Result<bool, AuthServiceError>;

    /// Remaining time-to-live; `None` when the key is gone or has no expiry.
    async fn remaining_ttl(&self, email: &str) -> Result<Option<Duration>, AuthServiceError>;

    async fn delete(&self, email: &str) -> Result<(), AuthServiceError>;
}

/// Hands a passcode to the mail collaborator.
pub trait PasscodeMailer: Send + Sync {
    async fn enqueue(
        &self,
        email: &str,
        passcode: &str,
        otp_id: Uuid,
        discard_after: DateTime<Utc>,
    ) -> Result<(), AuthServiceError>;
}

/// Durable session records, keyed by refresh-token digest.
pub trait SessionRepository: Send + Sync {
    async fn create(&self, record: &SessionRecord) -> Result<(), AuthServiceError>;

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<SessionRecord>, AuthServiceError>;

    /// Set `last_used_at`. Returns `false` when no row matched (concurrent logout).
    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AuthServiceError>;

    /// Returns `true` if a row was deleted.
    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<bool, AuthServiceError>;

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthServiceError>;

    /// Ownership-scoped delete. Returns `true` if a row was deleted.
    async fn delete_for_user(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, AuthServiceError>;

    /// Unexpired sessions of a user, newest `last_used_at` first.
    async fn list_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, AuthServiceError>;

    async fn exists_active(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError>;

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError>;
}

/// Durable elevation records plus the user pointer, always written together.
pub trait ElevationRepository: Send + Sync {
    /// Lock the user, reject if another session is elevated, revoke prior
    /// same-session grants, insert `record` and point the user at it.
    async fn grant(&self, record: &ElevationRecord) -> Result<GrantOutcome, AuthServiceError>;

    /// Revoke the active grant for the pair and clear the pointer if it names
    /// that session. `None` when nothing was active.
    async fn revoke(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ElevationRecord>, AuthServiceError>;
}

/// The dual-keyed allow-list. Both keys are only ever written or removed here.
pub trait ElevationAllowList: Send + Sync {
    /// Write both entries, removing the jti entry of whatever grant is replaced.
    async fn grant(
        &self,
        user_id: Uuid,
        entry: &UserElevationEntry,
        ttl: Duration,
    ) -> Result<(), AuthServiceError>;

    /// Read jti from the user entry, delete the jti entry, then the user entry.
    /// Returns the jti that was torn down, if any.
    async fn revoke(&self, user_id: Uuid) -> Result<Option<Uuid>, AuthServiceError>;

    async fn find_by_jti(&self, jti: Uuid) -> Result<Option<JtiElevationEntry>, AuthServiceError>;
}

/// Sorted set of pending elevation expiries.
pub trait ExpiryIndex: Send + Sync {
    fn add(
        &self,
        member: ExpiryMember,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), AuthServiceError>> + Send;

    /// Returns `true` only for the caller that actually removed the member.
    fn remove(&self, member: &str) -> impl Future<Output = Result<bool, AuthServiceError>> + Send;

    /// Raw members with score at or before `now`.
    fn due(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<String>, AuthServiceError>> + Send;
}

/// Failed elevation attempts per user within a rolling window.
pub trait AttemptLimiter: Send + Sync {
    async fn failures(&self, user_id: Uuid) -> Result<u32, AuthServiceError>;

    /// Count one failure; the window starts at the first failure.
    async fn record_failure(&self, user_id: Uuid, window: Duration)
    -> Result<u32, AuthServiceError>;

    async fn reset(&self, user_id: Uuid) -> Result<(), AuthServiceError>;
}

/// Pushes events to a user's realtime connections.
pub trait RealtimeNotifier: Send + Sync {
    fn notify_user(
        &self,
        user_id: Uuid,
        event: &str,
        payload: serde_json::Value,
    ) -> impl Future<Output = Result<(), AuthServiceError>> + Send;
}
