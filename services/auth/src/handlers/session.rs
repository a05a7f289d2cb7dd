use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tessera_auth_types::bearer::BearerToken;

use crate::error::AuthServiceError;
use crate::guard::SessionPrincipal;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

// ── POST /auth/token/refresh ──────────────────────────────────────────────────

#[derive(Serialize)]
pub struct RefreshTokenResponse {
    pub session_id: Uuid,
    pub access_token: String,
    #[serde(serialize_with = "tessera_core::serde::to_rfc3339_ms")]
    pub access_expires_at: DateTime<Utc>,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let out = state
        .session_service()
        .refresh_session(&body.refresh_token)
        .await?;
    Ok(Json(RefreshTokenResponse {
        session_id: out.session_id,
        access_token: out.access_token,
        access_expires_at: out.access_expires_at,
    }))
}

// ── GET /auth/session ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub session_id: Uuid,
    /// Access token expiry, unix seconds.
    pub exp: i64,
}

/// Full session check: token plus a live session row. Used by realtime
/// connection auth, where a logout must take effect immediately.
pub async fn validate_session(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<impl IntoResponse, AuthServiceError> {
    let token = token.ok_or(AuthServiceError::MissingToken)?;
    let claims = state
        .session_service()
        .validate_session(&token)
        .await?
        .ok_or(AuthServiceError::InvalidOrExpired)?;
    Ok(Json(SessionResponse {
        user_id: claims.sub,
        session_id: claims.sid,
        exp: claims.exp,
    }))
}

// ── POST /auth/logout ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

pub async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let success = state
        .session_service()
        .logout_session(&body.refresh_token)
        .await?;
    Ok(Json(LogoutResponse { success }))
}

// ── POST /auth/logout/all ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct LogoutAllResponse {
    pub count: u64,
}

pub async fn logout_all(
    State(state): State<AppState>,
    principal: SessionPrincipal,
) -> Result<impl IntoResponse, AuthServiceError> {
    let count = state
        .session_service()
        .logout_all_sessions(principal.user_id)
        .await?;
    Ok((StatusCode::OK, Json(LogoutAllResponse { count })))
}
