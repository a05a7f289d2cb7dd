//! Bearer credential extraction from request headers.

use axum::extract::FromRequestParts;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use http::request::Parts;
use std::convert::Infallible;

/// Header carrying the admin-elevation token alongside the session bearer token.
pub const X_ADMIN_TOKEN: &str = "x-admin-token";

/// Parse an `Authorization` value of the exact form `"Bearer <token>"`.
///
/// Anything else (other scheme, lowercase `bearer`, missing or extra parts)
/// yields `None`: absence of a usable token, not an error.
pub fn parse_bearer(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Bearer token from the `Authorization` header, if present and well-formed.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_bearer)
}

/// Raw admin token from the `x-admin-token` header.
pub fn admin_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(X_ADMIN_TOKEN)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Extractor yielding the bearer token, or `None` when the header is absent or malformed.
///
/// Never rejects; callers decide whether a missing token is an error.
#[derive(Debug, Clone)]
pub struct BearerToken(pub Option<String>);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    // axum-core 0.5 defines this as `fn -> impl Future + Send` (not `async fn`).
    // Extract synchronously and return a 'static async move block.
    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let token = bearer_token(&parts.headers).map(str::to_owned);
        async move { Ok(Self(token)) }
    }
}
