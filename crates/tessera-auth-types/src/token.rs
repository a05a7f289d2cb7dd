//! JWT claims, verification and (auth-service only) signing for the three
//! bearer-token categories.
//!
//! Each category uses its own HMAC secret and its own issuer/audience pair, so a
//! token minted for one purpose never verifies as another.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
use chrono::{DateTime, Duration, Utc};
#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
use jsonwebtoken::{EncodingKey, Header, encode};
#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
use serde::Serialize;

pub const ISSUER: &str = "tessera:auth";
pub const ADMIN_ISSUER: &str = "tessera:admin";
pub const ACCESS_AUDIENCE: &str = "tessera:access";
pub const REFRESH_AUDIENCE: &str = "tessera:refresh";
pub const ADMIN_AUDIENCE: &str = "tessera:admin";

/// Scope embedded in every admin-elevation token.
pub const ADMIN_SCOPE: &str = "admin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
    Admin,
}

impl TokenKind {
    pub fn issuer(self) -> &'static str {
        match self {
            Self::Access | Self::Refresh => ISSUER,
            Self::Admin => ADMIN_ISSUER,
        }
    }

    pub fn audience(self) -> &'static str {
        match self {
            Self::Access => ACCESS_AUDIENCE,
            Self::Refresh => REFRESH_AUDIENCE,
            Self::Admin => ADMIN_AUDIENCE,
        }
    }
}

/// Why a bearer credential was not accepted.
///
/// Callers branch on this: `Expired` means "refresh or re-login",
/// `MalformedOrTampered` means "drop the token", `VerificationFailed` is an
/// unexpected failure worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("token expired")]
    Expired,
    #[error("malformed or tampered token")]
    MalformedOrTampered,
    #[error("token verification failed: {0}")]
    VerificationFailed(String),
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl CredentialError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Expired => "TOKEN_EXPIRED",
            Self::MalformedOrTampered => "TOKEN_INVALID",
            Self::VerificationFailed(_) => "TOKEN_VERIFICATION_FAILED",
            Self::Signing(_) => "TOKEN_SIGNING_FAILED",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for CredentialError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_)
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => Self::MalformedOrTampered,
            _ => Self::VerificationFailed(err.to_string()),
        }
    }
}

// ── Claims ───────────────────────────────────────────────────────────────

/// Short-lived access token payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test), derive(Serialize))]
pub struct AccessClaims {
    /// User id.
    pub sub: Uuid,
    /// Session id.
    pub sid: Uuid,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Long-lived refresh token payload. Only honoured together with a live session record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test), derive(Serialize))]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub sid: Uuid,
    /// Device id derived at session creation.
    pub did: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Admin-elevation token payload. `jti` keys the allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[cfg_attr(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test), derive(Serialize))]
pub struct AdminClaims {
    pub sub: Uuid,
    pub sid: Uuid,
    pub jti: Uuid,
    pub scope: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

// ── Verification (all consumers) ─────────────────────────────────────────

/// HMAC secrets, one per token category.
#[derive(Clone)]
pub struct TokenSecrets {
    pub access: String,
    pub refresh: String,
    pub admin: String,
}

/// Verifies all three token categories.
#[derive(Clone)]
pub struct TokenVerifier {
    access: DecodingKey,
    refresh: DecodingKey,
    admin: DecodingKey,
}

impl TokenVerifier {
    pub fn new(secrets: &TokenSecrets) -> Self {
        Self {
            access: DecodingKey::from_secret(secrets.access.as_bytes()),
            refresh: DecodingKey::from_secret(secrets.refresh.as_bytes()),
            admin: DecodingKey::from_secret(secrets.admin.as_bytes()),
        }
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, CredentialError> {
        decode_claims(token, &self.access, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, CredentialError> {
        decode_claims(token, &self.refresh, TokenKind::Refresh)
    }

    /// Signature, expiry and scope only. Allow-list membership is checked by the auth service.
    pub fn verify_admin(&self, token: &str) -> Result<AdminClaims, CredentialError> {
        let claims: AdminClaims = decode_claims(token, &self.admin, TokenKind::Admin)?;
        if claims.scope != ADMIN_SCOPE {
            return Err(CredentialError::MalformedOrTampered);
        }
        Ok(claims)
    }
}

/// HS256 with issuer, audience and expiry enforced.
/// Default leeway of 60s covers clock skew between services.
fn decode_claims<T: DeserializeOwned>(
    token: &str,
    key: &DecodingKey,
    kind: TokenKind,
) -> Result<T, CredentialError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_issuer(&[kind.issuer()]);
    validation.set_audience(&[kind.audience()]);
    validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

    let data = decode::<T>(token, key, &validation)?;
    Ok(data.claims)
}

// ── Signing (auth service only) ──────────────────────────────────────────

/// Lifetimes for tokens whose expiry the signer decides itself.
/// Admin tokens carry the expiry of their elevation record instead.
#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Token issuer. Requires the `USE_ONLY_IN_AUTH_SERVICE` feature.
#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
#[derive(Clone)]
pub struct TokenSigner {
    access: EncodingKey,
    refresh: EncodingKey,
    admin: EncodingKey,
    lifetimes: TokenLifetimes,
    verifier: TokenVerifier,
}

#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
impl TokenSigner {
    pub fn new(secrets: &TokenSecrets, lifetimes: TokenLifetimes) -> Self {
        Self {
            access: EncodingKey::from_secret(secrets.access.as_bytes()),
            refresh: EncodingKey::from_secret(secrets.refresh.as_bytes()),
            admin: EncodingKey::from_secret(secrets.admin.as_bytes()),
            lifetimes,
            verifier: TokenVerifier::new(secrets),
        }
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn sign_access(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<SignedToken, CredentialError> {
        let now = Utc::now();
        let expires_at = whole_seconds(now + self.lifetimes.access);
        let claims = AccessClaims {
            sub: user_id,
            sid: session_id,
            iss: TokenKind::Access.issuer().to_owned(),
            aud: TokenKind::Access.audience().to_owned(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = sign(&claims, &self.access)?;
        Ok(SignedToken { token, expires_at })
    }

    pub fn sign_refresh(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        device_id: &str,
    ) -> Result<SignedToken, CredentialError> {
        let now = Utc::now();
        let expires_at = whole_seconds(now + self.lifetimes.refresh);
        let claims = RefreshClaims {
            sub: user_id,
            sid: session_id,
            did: device_id.to_owned(),
            iss: TokenKind::Refresh.issuer().to_owned(),
            aud: TokenKind::Refresh.audience().to_owned(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = sign(&claims, &self.refresh)?;
        Ok(SignedToken { token, expires_at })
    }

    pub fn sign_admin(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        jti: Uuid,
        scope: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<SignedToken, CredentialError> {
        let claims = AdminClaims {
            sub: user_id,
            sid: session_id,
            jti,
            scope: scope.to_owned(),
            iss: TokenKind::Admin.issuer().to_owned(),
            aud: TokenKind::Admin.audience().to_owned(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = sign(&claims, &self.admin)?;
        Ok(SignedToken {
            token,
            expires_at: whole_seconds(expires_at),
        })
    }
}

#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, CredentialError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| CredentialError::Signing(e.to_string()))
}

/// `exp` is second-granular; report the same instant the token will carry.
#[cfg(any(feature = "USE_ONLY_IN_AUTH_SERVICE", test))]
fn whole_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}
