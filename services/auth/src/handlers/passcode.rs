use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::repository::UserRepository;
use crate::error::AuthServiceError;
use crate::guard::ClientMeta;
use crate::state::AppState;
use crate::usecase::passcode::{PasscodeCode, PasscodeTiming, normalize_email};
use crate::usecase::session::CreateSessionInput;

fn outcome_status(code: PasscodeCode) -> StatusCode {
    match code {
        PasscodeCode::PasscodeSent | PasscodeCode::Verified => StatusCode::CREATED,
        PasscodeCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        PasscodeCode::Invalid | PasscodeCode::Expired | PasscodeCode::AttemptsExceeded => {
            StatusCode::UNAUTHORIZED
        }
    }
}

// ── POST /auth/passcode ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RequestPasscodeRequest {
    pub email: String,
}

#[derive(Serialize)]
pub struct RequestPasscodeResponse {
    pub success: bool,
    pub code: PasscodeCode,
    pub message: &'static str,
    pub timing: PasscodeTiming,
}

pub async fn request_passcode(
    State(state): State<AppState>,
    Json(body): Json<RequestPasscodeRequest>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let out = state.passcode_service().request(&body.email).await?;
    let response = RequestPasscodeResponse {
        success: out.code.is_success(),
        code: out.code,
        message: out.code.message(),
        timing: out.timing,
    };
    Ok((outcome_status(out.code), Json(response)))
}

// ── POST /auth/passcode/verify ────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct VerifyPasscodeRequest {
    pub email: String,
    pub code: String,
    pub device_name: Option<String>,
    pub device_fingerprint: Option<String>,
}

#[derive(Serialize)]
pub struct VerifyPasscodeResponse {
    pub success: bool,
    pub code: PasscodeCode,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionTokens>,
}

#[derive(Serialize)]
pub struct SessionTokens {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub access_token: String,
    #[serde(serialize_with = "tessera_core::serde::to_rfc3339_ms")]
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    #[serde(serialize_with = "tessera_core::serde::to_rfc3339_ms")]
    pub expires_at: DateTime<Utc>,
}

pub async fn verify_passcode(
    State(state): State<AppState>,
    client: ClientMeta,
    Json(body): Json<VerifyPasscodeRequest>,
) -> Result<impl IntoResponse, AuthServiceError> {
    let outcome = state
        .passcode_service()
        .verify(&body.email, &body.code)
        .await?;

    let session = if outcome.code == PasscodeCode::Verified {
        let user = state
            .user_repo()
            .find_or_create_by_email(&normalize_email(&body.email))
            .await?;
        let created = state
            .session_service()
            .create_session(CreateSessionInput {
                user_id: user.id,
                user_agent: client.user_agent,
                ip_address: client.ip_address,
                device_name: body.device_name,
                device_fingerprint: body.device_fingerprint,
            })
            .await?;
        Some(SessionTokens {
            user_id: user.id,
            session_id: created.session_id,
            access_token: created.access_token,
            access_expires_at: created.access_expires_at,
            refresh_token: created.refresh_token,
            expires_at: created.expires_at,
        })
    } else {
        None
    };

    let response = VerifyPasscodeResponse {
        success: outcome.code.is_success(),
        code: outcome.code,
        message: outcome.code.message(),
        attempts_remaining: outcome.attempts_remaining,
        session,
    };
    Ok((outcome_status(outcome.code), Json(response)))
}
