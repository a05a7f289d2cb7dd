use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthServiceError;
use crate::guard::{AdminPrincipal, ClientMeta, SessionPrincipal};
use crate::state::AppState;
use crate::usecase::elevation::ElevateInput;

// ── POST /auth/admin/elevation ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ElevateRequest {
    pub password_hash: String,
}

#[derive(Serialize)]
pub struct ElevateResponse {
    pub admin_token: String,
    #[serde(serialize_with = "tessera_core::serde::to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
}

pub async fn elevate(
    State(state): State<AppState>,
    principal: SessionPrincipal,
    client: ClientMeta,
    Json(body): Json<ElevateRequest>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let out = state
        .elevation_service()
        .elevate(ElevateInput {
            user_id: principal.user_id,
            session_id: principal.session_id,
            password_hash: body.password_hash,
            ip_address: Some(client.ip_address),
            user_agent: Some(client.user_agent),
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ElevateResponse {
            admin_token: out.admin_token,
            expires_at: out.expires_at,
        }),
    ))
}

// ── DELETE /auth/admin/elevation ──────────────────────────────────────────────

#[derive(Serialize)]
pub struct RevokeResponse {
    pub success: bool,
}

pub async fn revoke(
    State(state): State<AppState>,
    principal: SessionPrincipal,
) -> Result<impl IntoResponse, AuthServiceError> {
    state
        .elevation_service()
        .revoke(principal.user_id, principal.session_id)
        .await?;
    Ok(Json(RevokeResponse { success: true }))
}

// ── GET /auth/admin/elevation ─────────────────────────────────────────────────

pub async fn status(
    State(state): State<AppState>,
    principal: SessionPrincipal,
) -> Result<impl IntoResponse, AuthServiceError> {
    let status = state
        .elevation_service()
        .status(principal.user_id, principal.session_id)
        .await?;
    Ok(Json(status))
}

// ── GET /auth/admin/check ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct AdminCheckResponse {
    pub user_id: Uuid,
    pub session_id: Uuid,
    /// Admin token expiry, unix seconds.
    pub exp: i64,
}

/// Probe for other services: 200 when the caller holds a live admin token.
pub async fn check(admin: AdminPrincipal) -> Json<AdminCheckResponse> {
    Json(AdminCheckResponse {
        user_id: admin.user_id,
        session_id: admin.session_id,
        exp: admin.expires_at,
    })
}
