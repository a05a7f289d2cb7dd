use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use tessera_auth_types::token::CredentialError;

/// Auth service domain error variants.
///
/// Passcode outcomes are not errors; they are rendered by the passcode handlers.
#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    #[error("missing bearer token")]
    MissingToken,
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("refresh token is invalid or expired")]
    InvalidOrExpired,
    #[error("invalid admin password")]
    InvalidPassword,
    #[error("an elevation is already active on another session")]
    ElevationActive,
    #[error("no active elevation for this session")]
    ElevationNotFound,
    #[error("admin elevation required")]
    ElevationRequired,
    #[error("too many failed elevation attempts")]
    TooManyAttempts,
    #[error("device not found")]
    DeviceNotFound,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingToken => "MISSING_TOKEN",
            Self::Credential(e) => e.kind(),
            Self::InvalidOrExpired => "INVALID_OR_EXPIRED",
            Self::InvalidPassword => "INVALID_PASSWORD",
            Self::ElevationActive => "ELEVATION_ACTIVE",
            Self::ElevationNotFound => "ELEVATION_NOT_FOUND",
            Self::ElevationRequired => "ELEVATION_REQUIRED",
            Self::TooManyAttempts => "TOO_MANY_ATTEMPTS",
            Self::DeviceNotFound => "DEVICE_NOT_FOUND",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidOrExpired | Self::InvalidPassword => {
                StatusCode::UNAUTHORIZED
            }
            Self::Credential(CredentialError::Expired | CredentialError::MalformedOrTampered) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Credential(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ElevationActive => StatusCode::CONFLICT,
            Self::ElevationNotFound | Self::DeviceNotFound => StatusCode::NOT_FOUND,
            Self::ElevationRequired => StatusCode::FORBIDDEN,
            Self::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sea_orm::DbErr> for AuthServiceError {
    fn from(e: sea_orm::DbErr) -> Self {
        Self::Internal(e.into())
    }
}

impl IntoResponse for AuthServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Only infrastructure failures are logged here. TraceLayer already records
        // method/uri/status for every request, so 4xx would just be noise.
        match &self {
            Self::Internal(e) => {
                tracing::error!(error = ?e, kind = "INTERNAL", "internal error");
            }
            Self::Credential(e @ (CredentialError::VerificationFailed(_) | CredentialError::Signing(_))) => {
                tracing::error!(error = %e, kind = e.kind(), "credential failure");
            }
            _ => {}
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
