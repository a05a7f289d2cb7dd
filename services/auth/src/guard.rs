//! Request guards for session-authenticated and admin-elevated routes.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use std::convert::Infallible;
use uuid::Uuid;

use tessera_auth_types::bearer::{admin_token, bearer_token};
use tessera_auth_types::token::TokenVerifier;

use crate::domain::repository::ElevationAllowList;
use crate::error::AuthServiceError;
use crate::state::AppState;
use crate::usecase::elevation::validate_admin_token;

/// Caller authenticated by a valid access token.
///
/// Signature and expiry only; use `SessionService::validate_session` where an
/// immediate server-side logout must be honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPrincipal {
    pub user_id: Uuid,
    pub session_id: Uuid,
}

/// Caller holding an allow-listed admin token for its own session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminPrincipal {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub jti: Uuid,
    /// Admin token expiry, unix seconds.
    pub expires_at: i64,
}

pub fn authenticate_bearer(
    headers: &HeaderMap,
    verifier: &TokenVerifier,
) -> Result<SessionPrincipal, AuthServiceError> {
    let token = bearer_token(headers).ok_or(AuthServiceError::MissingToken)?;
    let claims = verifier.verify_access(token)?;
    Ok(SessionPrincipal {
        user_id: claims.sub,
        session_id: claims.sid,
    })
}

pub async fn authorize_admin<A: ElevationAllowList>(
    headers: &HeaderMap,
    session: SessionPrincipal,
    allow_list: &A,
    verifier: &TokenVerifier,
) -> Result<AdminPrincipal, AuthServiceError> {
    let token = admin_token(headers).ok_or(AuthServiceError::ElevationRequired)?;
    let claims = validate_admin_token(allow_list, verifier, token).await?;
    if claims.sub != session.user_id || claims.sid != session.session_id {
        tracing::warn!(
            user_id = %session.user_id,
            session_id = %session.session_id,
            "admin token presented from another session"
        );
        return Err(AuthServiceError::ElevationRequired);
    }
    Ok(AdminPrincipal {
        user_id: claims.sub,
        session_id: claims.sid,
        jti: claims.jti,
        expires_at: claims.exp,
    })
}

impl FromRequestParts<AppState> for SessionPrincipal {
    type Rejection = AuthServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate_bearer(&parts.headers, state.verifier())
    }
}

impl FromRequestParts<AppState> for AdminPrincipal {
    type Rejection = AuthServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = authenticate_bearer(&parts.headers, state.verifier())?;
        let allow_list = state.elevation_cache();
        authorize_admin(&parts.headers, session, &allow_list, state.verifier()).await
    }
}

/// Client address and user agent for session and elevation metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip_address: String,
    pub user_agent: String,
}

impl ClientMeta {
    /// First `x-forwarded-for` hop, then `x-real-ip`, else `"unknown"`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or_else(|| header("x-real-ip"))
            .unwrap_or("unknown")
            .to_owned();
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_owned();
        Self {
            ip_address,
            user_agent,
        }
    }
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
