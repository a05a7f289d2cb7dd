use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AuthServiceError;
use crate::guard::SessionPrincipal;
use crate::state::AppState;
use crate::usecase::session::DeviceInfo;

#[derive(Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceInfo>,
}

// ── GET /auth/devices ─────────────────────────────────────────────────────────

pub async fn list_devices(
    State(state): State<AppState>,
    principal: SessionPrincipal,
) -> Result<impl IntoResponse, AuthServiceError> {
    let devices = state
        .session_service()
        .list_devices(principal.user_id, Some(principal.session_id))
        .await?;
    Ok(Json(DevicesResponse { devices }))
}

// ── DELETE /auth/devices/{session_id} ────────────────────────────────────────

pub async fn logout_device(
    State(state): State<AppState>,
    principal: SessionPrincipal,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AuthServiceError> {
    let deleted = state
        .session_service()
        .logout_device(principal.user_id, session_id)
        .await?;
    if !deleted {
        return Err(AuthServiceError::DeviceNotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
