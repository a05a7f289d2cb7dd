use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use tessera_auth_types::token::{AccessClaims, TokenSigner};

use crate::domain::device::{default_device_name, derive_device_id};
use crate::domain::repository::SessionRepository;
use crate::domain::types::SessionRecord;
use crate::error::AuthServiceError;

/// SHA-256 hex of a refresh token. Session rows are keyed by this, never the raw token.
pub fn refresh_token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

pub struct CreateSessionInput {
    pub user_id: Uuid,
    pub user_agent: String,
    pub ip_address: String,
    pub device_name: Option<String>,
    pub device_fingerprint: Option<String>,
}

#[derive(Debug)]
pub struct CreateSessionOutput {
    pub session_id: Uuid,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    /// Absolute session expiry.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RefreshOutput {
    pub session_id: Uuid,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub session_id: Uuid,
    pub device_id: String,
    pub device_name: String,
    pub user_agent: String,
    pub ip_address: String,
    #[serde(serialize_with = "tessera_core::serde::to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "tessera_core::serde::to_rfc3339_ms")]
    pub last_used_at: DateTime<Utc>,
    #[serde(serialize_with = "tessera_core::serde::to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
    /// The session making the request.
    pub current: bool,
}

pub struct SessionService<R: SessionRepository> {
    pub sessions: R,
    pub signer: Arc<TokenSigner>,
}

impl<R: SessionRepository> SessionService<R> {
    pub async fn create_session(
        &self,
        input: CreateSessionInput,
    ) -> Result<CreateSessionOutput, AuthServiceError> {
        let session_id = Uuid::new_v4();
        let device_id = derive_device_id(
            input.device_fingerprint.as_deref(),
            &input.user_agent,
            &input.ip_address,
        );
        let device_name = input
            .device_name
            .map(|n| n.trim().to_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_device_name(&input.user_agent));

        let access = self.signer.sign_access(input.user_id, session_id)?;
        let refresh = self
            .signer
            .sign_refresh(input.user_id, session_id, &device_id)?;

        let now = Utc::now();
        let record = SessionRecord {
            id: session_id,
            user_id: input.user_id,
            refresh_token_hash: refresh_token_digest(&refresh.token),
            device_id,
            device_name,
            user_agent: input.user_agent,
            ip_address: input.ip_address,
            created_at: now,
            last_used_at: now,
            expires_at: refresh.expires_at,
        };
        self.sessions.create(&record).await?;

        tracing::info!(user_id = %record.user_id, session_id = %session_id, "session created");
        Ok(CreateSessionOutput {
            session_id,
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: refresh.token,
            expires_at: record.expires_at,
        })
    }

    /// Mint a new access token. The refresh token is not rotated.
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshOutput, AuthServiceError> {
        let claims = self.signer.verifier().verify_refresh(refresh_token)?;
        let now = Utc::now();

        // The stored record governs, not just the token's own expiry.
        let record = self
            .sessions
            .find_by_token_hash(&refresh_token_digest(refresh_token))
            .await?
            .ok_or(AuthServiceError::InvalidOrExpired)?;
        if record.is_expired(now) || record.id != claims.sid || record.user_id != claims.sub {
            return Err(AuthServiceError::InvalidOrExpired);
        }

        // Zero rows touched means a logout won the race.
        if !self.sessions.touch(record.id, now).await? {
            return Err(AuthServiceError::InvalidOrExpired);
        }

        let access = self.signer.sign_access(record.user_id, record.id)?;
        Ok(RefreshOutput {
            session_id: record.id,
            access_token: access.token,
            access_expires_at: access.expires_at,
        })
    }

    /// Idempotent; `false` when nothing matched.
    pub async fn logout_session(&self, refresh_token: &str) -> Result<bool, AuthServiceError> {
        let deleted = self
            .sessions
            .delete_by_token_hash(&refresh_token_digest(refresh_token))
            .await?;
        if deleted {
            tracing::info!("session logged out");
        }
        Ok(deleted)
    }

    pub async fn logout_all_sessions(&self, user_id: Uuid) -> Result<u64, AuthServiceError> {
        let count = self.sessions.delete_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, count, "all sessions logged out");
        Ok(count)
    }

    pub async fn logout_device(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, AuthServiceError> {
        self.sessions.delete_for_user(user_id, session_id).await
    }

    pub async fn list_devices(
        &self,
        user_id: Uuid,
        current_session: Option<Uuid>,
    ) -> Result<Vec<DeviceInfo>, AuthServiceError> {
        let records = self.sessions.list_active(user_id, Utc::now()).await?;
        Ok(records
            .into_iter()
            .map(|r| DeviceInfo {
                current: current_session == Some(r.id),
                session_id: r.id,
                device_id: r.device_id,
                device_name: r.device_name,
                user_agent: r.user_agent,
                ip_address: r.ip_address,
                created_at: r.created_at,
                last_used_at: r.last_used_at,
                expires_at: r.expires_at,
            })
            .collect())
    }

    /// Claims of a valid access token whose session still exists.
    ///
    /// `Ok(None)` means the token is fine but its session was logged out or expired.
    /// Credential failures propagate as errors.
    pub async fn validate_session(
        &self,
        access_token: &str,
    ) -> Result<Option<AccessClaims>, AuthServiceError> {
        let claims = self.signer.verifier().verify_access(access_token)?;
        let live = self
            .sessions
            .exists_active(claims.sub, claims.sid, Utc::now())
            .await?;
        Ok(live.then_some(claims))
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, AuthServiceError> {
        self.sessions.delete_expired(Utc::now()).await
    }
}
