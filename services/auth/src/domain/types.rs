use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Auth-relevant user data, including the admin elevation pointer.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub elevated_session_id: Option<Uuid>,
    pub elevated_until: Option<DateTime<Utc>>,
}

impl AuthUser {
    /// Pointer names `session_id` and has not lapsed yet.
    pub fn is_elevated_on(&self, session_id: Uuid, now: DateTime<Utc>) -> bool {
        self.elevated_session_id == Some(session_id)
            && self.elevated_until.is_some_and(|until| until > now)
    }
}

/// One-time passcode held in the TTL store under `passcode:{email}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasscodeRecord {
    pub otp_id: Uuid,
    pub code: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

/// Durable session row. The refresh token itself is never stored, only its digest.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub refresh_token_hash: String,
    pub device_id: String,
    pub device_name: String,
    pub user_agent: String,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Durable admin elevation grant.
#[derive(Debug, Clone)]
pub struct ElevationRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub jti: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Result of writing a new elevation grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Record inserted and pointer set. `superseded` lists the jtis of prior
    /// same-session grants revoked in the same transaction.
    Granted { superseded: Vec<Uuid> },
    /// Another session of this user holds an active elevation; nothing written.
    ActiveElsewhere,
}

/// Allow-list value stored under `admin:elevation:user:{userId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserElevationEntry {
    pub session_id: Uuid,
    pub jti: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Allow-list value stored under `admin:elevation:jti:{jti}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JtiElevationEntry {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

/// Expiry index member, encoded as `{userId}:{sessionId}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryMember {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

impl ExpiryMember {
    pub fn encode(&self) -> String {
        format!("{}:{}", self.user_id, self.session_id)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (user, session) = raw.split_once(':')?;
        Some(Self {
            user_id: user.parse().ok()?,
            session_id: session.parse().ok()?,
        })
    }
}

/// Expiry index score: unix millis rounded up, so a member never comes due
/// before the instant it names.
pub fn expiry_score(at: DateTime<Utc>) -> i64 {
    let millis = at.timestamp_millis();
    if at.timestamp_subsec_nanos() % 1_000_000 == 0 {
        millis
    } else {
        millis + 1
    }
}

/// Outbox event for async delivery (passcode email).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub kind: String,
    pub recipient: String,
    pub payload: serde_json::Value,
    pub idempotency_key: String,
    pub discard_after: DateTime<Utc>,
}

pub const PASSCODE_REQUESTED: &str = "passcode_requested";

/// Realtime event emitted when an elevation ends.
pub const ADMIN_REVOKED_EVENT: &str = "admin:revoked";
