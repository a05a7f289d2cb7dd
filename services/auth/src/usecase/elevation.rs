//! Admin elevation: a time-boxed privilege pinned to one session per user.
//!
//! Per user the lifecycle is `NONE -> ACTIVE -> (EXPIRED | REVOKED) -> NONE`.
//! The database record and the user's pointer are the source of truth; the
//! allow-list serves request-time token checks and the expiry index only tells
//! the watcher when to look.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use tessera_auth_types::token::{ADMIN_SCOPE, AdminClaims, CredentialError, TokenSigner, TokenVerifier};

use crate::domain::repository::{
    AttemptLimiter, ElevationAllowList, ElevationRepository, ExpiryIndex, RealtimeNotifier,
    UserRepository,
};
use crate::domain::types::{
    ADMIN_REVOKED_EVENT, ElevationRecord, ExpiryMember, GrantOutcome, UserElevationEntry,
};
use crate::error::AuthServiceError;
use crate::usecase::constant_time_eq;

#[derive(Debug, Clone)]
pub struct ElevationPolicy {
    pub lifetime: Duration,
    pub admin_password_hash: String,
    pub max_failed_attempts: u32,
    pub attempt_window: StdDuration,
}

pub struct ElevateInput {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub password_hash: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug)]
pub struct ElevateOutput {
    pub admin_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElevationStatus {
    pub elevated: bool,
    #[serde(serialize_with = "tessera_core::serde::to_rfc3339_ms_opt")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Payload of the `admin:revoked` realtime event.
pub fn revoked_payload(session_id: Uuid, reason: &str) -> serde_json::Value {
    json!({ "sessionId": session_id, "reason": reason })
}

/// Request-time admin token check: signature, then allow-list membership.
///
/// A token whose jti entry is gone (revoked or superseded) is rejected even
/// before its own expiry.
pub async fn validate_admin_token<A: ElevationAllowList>(
    allow_list: &A,
    verifier: &TokenVerifier,
    token: &str,
) -> Result<AdminClaims, AuthServiceError> {
    let claims = verifier.verify_admin(token).map_err(|e| match e {
        CredentialError::Expired | CredentialError::MalformedOrTampered => {
            AuthServiceError::ElevationRequired
        }
        other => AuthServiceError::Credential(other),
    })?;

    let entry = allow_list
        .find_by_jti(claims.jti)
        .await?
        .ok_or(AuthServiceError::ElevationRequired)?;
    if entry.user_id != claims.sub || entry.session_id != claims.sid {
        return Err(AuthServiceError::ElevationRequired);
    }
    Ok(claims)
}

pub struct ElevationService<E, A, X, L, N, U>
where
    E: ElevationRepository,
    A: ElevationAllowList,
    X: ExpiryIndex,
    L: AttemptLimiter,
    N: RealtimeNotifier,
    U: UserRepository,
{
    pub elevations: E,
    pub allow_list: A,
    pub index: X,
    pub limiter: L,
    pub notifier: N,
    pub users: U,
    pub signer: Arc<TokenSigner>,
    pub policy: ElevationPolicy,
}

impl<E, A, X, L, N, U> ElevationService<E, A, X, L, N, U>
where
    E: ElevationRepository,
    A: ElevationAllowList,
    X: ExpiryIndex,
    L: AttemptLimiter,
    N: RealtimeNotifier,
    U: UserRepository,
{
    pub async fn elevate(&self, input: ElevateInput) -> Result<ElevateOutput, AuthServiceError> {
        let user_id = input.user_id;
        let session_id = input.session_id;

        if self.limiter.failures(user_id).await? >= self.policy.max_failed_attempts {
            return Err(AuthServiceError::TooManyAttempts);
        }

        if !constant_time_eq(
            input.password_hash.as_bytes(),
            self.policy.admin_password_hash.as_bytes(),
        ) {
            let failures = self
                .limiter
                .record_failure(user_id, self.policy.attempt_window)
                .await?;
            tracing::warn!(user_id = %user_id, failures, "admin elevation rejected: bad password");
            return Err(AuthServiceError::InvalidPassword);
        }

        let now = Utc::now();
        let record = ElevationRecord {
            id: Uuid::new_v4(),
            user_id,
            session_id,
            jti: Uuid::new_v4(),
            issued_at: now,
            expires_at: now + self.policy.lifetime,
            revoked_at: None,
            ip_address: input.ip_address,
            user_agent: input.user_agent,
        };

        let superseded = match self.elevations.grant(&record).await? {
            GrantOutcome::Granted { superseded } => superseded,
            GrantOutcome::ActiveElsewhere => return Err(AuthServiceError::ElevationActive),
        };
        // The grant is committed; a stale failure counter only delays a later elevate.
        if let Err(e) = self.limiter.reset(user_id).await {
            tracing::warn!(user_id = %user_id, error = ?e, "failed to reset elevation attempts");
        }

        let entry = UserElevationEntry {
            session_id,
            jti: record.jti,
            expires_at: record.expires_at,
        };
        let ttl = self.policy.lifetime.to_std().unwrap_or_default();
        self.allow_list.grant(user_id, &entry, ttl).await?;
        self.index
            .add(ExpiryMember { user_id, session_id }, record.expires_at)
            .await?;

        let token = self.signer.sign_admin(
            user_id,
            session_id,
            record.jti,
            ADMIN_SCOPE,
            record.issued_at,
            record.expires_at,
        )?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            jti = %record.jti,
            superseded = superseded.len(),
            "admin elevation granted"
        );
        Ok(ElevateOutput {
            admin_token: token.token,
            expires_at: token.expires_at,
        })
    }

    pub async fn revoke(&self, user_id: Uuid, session_id: Uuid) -> Result<(), AuthServiceError> {
        let record = self
            .elevations
            .revoke(user_id, session_id, Utc::now())
            .await?
            .ok_or(AuthServiceError::ElevationNotFound)?;

        // Allow-list first, so the token stops validating before anything else.
        self.allow_list.revoke(user_id).await?;
        self.index
            .remove(&ExpiryMember { user_id, session_id }.encode())
            .await?;

        tracing::info!(user_id = %user_id, session_id = %session_id, jti = %record.jti, "admin elevation revoked");

        if let Err(e) = self
            .notifier
            .notify_user(user_id, ADMIN_REVOKED_EVENT, revoked_payload(session_id, "revoked"))
            .await
        {
            tracing::warn!(user_id = %user_id, error = %e, "failed to notify elevation revoke");
        }
        Ok(())
    }

    /// Database-only check against the user's elevation pointer.
    pub async fn is_session_elevated(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, AuthServiceError> {
        let user = self.users.find_by_id(user_id).await?;
        Ok(user.is_some_and(|u| u.is_elevated_on(session_id, Utc::now())))
    }

    pub async fn status(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<ElevationStatus, AuthServiceError> {
        let now = Utc::now();
        let status = match self.users.find_by_id(user_id).await? {
            Some(user) if user.is_elevated_on(session_id, now) => ElevationStatus {
                elevated: true,
                expires_at: user.elevated_until,
            },
            _ => ElevationStatus {
                elevated: false,
                expires_at: None,
            },
        };
        Ok(status)
    }

    pub async fn validate_admin_token(&self, token: &str) -> Result<AdminClaims, AuthServiceError> {
        validate_admin_token(&self.allow_list, self.signer.verifier(), token).await
    }
}
