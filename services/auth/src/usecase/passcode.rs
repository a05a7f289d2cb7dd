use chrono::{DateTime, Duration, Utc};
use rand::RngExt;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::repository::{PasscodeMailer, PasscodeStore};
use crate::domain::types::PasscodeRecord;
use crate::error::AuthServiceError;
use crate::usecase::constant_time_eq;

#[derive(Debug, Clone, Copy)]
pub struct PasscodePolicy {
    pub length: usize,
    pub expiry: Duration,
    pub resend_cooldown: Duration,
    pub max_attempts: u32,
}

/// Stable outcome codes. Business failures are outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PasscodeCode {
    PasscodeSent,
    RateLimited,
    Verified,
    Invalid,
    Expired,
    AttemptsExceeded,
}

impl PasscodeCode {
    pub fn is_success(self) -> bool {
        matches!(self, Self::PasscodeSent | Self::Verified)
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::PasscodeSent => "passcode sent",
            Self::RateLimited => "a passcode was sent recently, please wait before requesting another",
            Self::Verified => "passcode verified",
            Self::Invalid => "incorrect passcode",
            Self::Expired => "passcode expired or not found",
            Self::AttemptsExceeded => "too many incorrect attempts, request a new passcode",
        }
    }
}

/// Timing metadata for client display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasscodeTiming {
    pub otp_id: Uuid,
    #[serde(serialize_with = "tessera_core::serde::to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
    #[serde(serialize_with = "tessera_core::serde::to_rfc3339_ms")]
    pub resend_available_at: DateTime<Utc>,
    pub attempts_remaining: u32,
}

#[derive(Debug, Clone)]
pub struct RequestPasscodeOutcome {
    pub code: PasscodeCode,
    pub timing: PasscodeTiming,
}

#[derive(Debug, Clone)]
pub struct VerifyPasscodeOutcome {
    pub code: PasscodeCode,
    pub attempts_remaining: Option<u32>,
}

impl VerifyPasscodeOutcome {
    fn of(code: PasscodeCode) -> Self {
        Self {
            code,
            attempts_remaining: None,
        }
    }
}

/// Trimmed, lowercased. Every passcode key and user lookup goes through this.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

pub struct PasscodeService<S, M>
where
    S: PasscodeStore,
    M: PasscodeMailer,
{
    pub store: S,
    pub mailer: M,
    pub policy: PasscodePolicy,
}

impl<S, M> PasscodeService<S, M>
where
    S: PasscodeStore,
    M: PasscodeMailer,
{
    pub async fn request(&self, email: &str) -> Result<RequestPasscodeOutcome, AuthServiceError> {
        let email = normalize_email(email);
        let now = Utc::now();

        // Within the cooldown the existing record is reported untouched.
        let existing = self.store.get(&email).await?;
        if let Some(existing) = &existing {
            if now - existing.created_at < self.policy.resend_cooldown {
                return self.rate_limited(&email, existing, now).await;
            }
        }

        let record = PasscodeRecord {
            otp_id: Uuid::new_v4(),
            code: generate_code(self.policy.length),
            attempts: 0,
            created_at: now,
        };
        let expires_at = now + self.policy.expiry;
        let ttl = to_std(self.policy.expiry);
        if existing.is_some() {
            self.store.put(&email, &record, ttl).await?;
        } else if !self.store.put_if_absent(&email, &record, ttl).await? {
            // A concurrent request created the record first; report that one.
            match self.store.get(&email).await? {
                Some(winner) => return self.rate_limited(&email, &winner, now).await,
                None => self.store.put(&email, &record, ttl).await?,
            }
        }
        self.mailer
            .enqueue(&email, &record.code, record.otp_id, expires_at)
            .await?;

        tracing::info!(otp_id = %record.otp_id, "passcode issued");
        Ok(RequestPasscodeOutcome {
            code: PasscodeCode::PasscodeSent,
            timing: PasscodeTiming {
                otp_id: record.otp_id,
                expires_at,
                resend_available_at: now + self.policy.resend_cooldown,
                attempts_remaining: self.policy.max_attempts,
            },
        })
    }

    async fn rate_limited(
        &self,
        email: &str,
        existing: &PasscodeRecord,
        now: DateTime<Utc>,
    ) -> Result<RequestPasscodeOutcome, AuthServiceError> {
        let expires_at = match self.store.remaining_ttl(email).await? {
            Some(ttl) => now + to_chrono(ttl),
            None => existing.created_at + self.policy.expiry,
        };
        tracing::debug!(otp_id = %existing.otp_id, "passcode request rate limited");
        Ok(RequestPasscodeOutcome {
            code: PasscodeCode::RateLimited,
            timing: PasscodeTiming {
                otp_id: existing.otp_id,
                expires_at,
                resend_available_at: existing.created_at + self.policy.resend_cooldown,
                attempts_remaining: self.policy.max_attempts.saturating_sub(existing.attempts),
            },
        })
    }

    pub async fn verify(
        &self,
        email: &str,
        submitted: &str,
    ) -> Result<VerifyPasscodeOutcome, AuthServiceError> {
        let email = normalize_email(email);
        let max = self.policy.max_attempts;

        let Some(mut record) = self.store.get(&email).await? else {
            return Ok(VerifyPasscodeOutcome::of(PasscodeCode::Expired));
        };

        if record.attempts >= max {
            self.store.delete(&email).await?;
            return Ok(VerifyPasscodeOutcome::of(PasscodeCode::AttemptsExceeded));
        }

        if constant_time_eq(record.code.as_bytes(), submitted.trim().as_bytes()) {
            self.store.delete(&email).await?;
            tracing::info!(otp_id = %record.otp_id, "passcode verified");
            return Ok(VerifyPasscodeOutcome::of(PasscodeCode::Verified));
        }

        record.attempts += 1;
        if record.attempts >= max {
            self.store.delete(&email).await?;
            tracing::info!(otp_id = %record.otp_id, "passcode attempts exhausted");
            return Ok(VerifyPasscodeOutcome {
                code: PasscodeCode::AttemptsExceeded,
                attempts_remaining: Some(0),
            });
        }

        // Keep the remaining TTL so failed attempts never extend the record's life.
        match self.store.remaining_ttl(&email).await? {
            Some(ttl) if !ttl.is_zero() => self.store.put(&email, &record, ttl).await?,
            _ => {
                self.store.delete(&email).await?;
                return Ok(VerifyPasscodeOutcome::of(PasscodeCode::Expired));
            }
        }

        Ok(VerifyPasscodeOutcome {
            code: PasscodeCode::Invalid,
            attempts_remaining: Some(max - record.attempts),
        })
    }
}

fn to_std(d: Duration) -> std::time::Duration {
    d.to_std().unwrap_or_default()
}

fn to_chrono(d: std::time::Duration) -> Duration {
    Duration::from_std(d).unwrap_or_else(|_| Duration::zero())
}
