//! Token and header helpers for integration tests.
//!
//! `TestAuth` signs real tokens with fixed secrets, so guards and use cases
//! run their normal verification path without any environment setup.

use axum::http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
use chrono::{Duration, Utc};
use uuid::Uuid;

use tessera_auth_types::bearer::X_ADMIN_TOKEN;
use tessera_auth_types::token::{ADMIN_SCOPE, TokenLifetimes, TokenSecrets, TokenSigner};

pub const TEST_ACCESS_SECRET: &str = "test-access-secret-for-unit-tests-only";
pub const TEST_REFRESH_SECRET: &str = "test-refresh-secret-for-unit-tests-only";
pub const TEST_ADMIN_SECRET: &str = "test-admin-secret-for-unit-tests-only";

pub fn test_secrets() -> TokenSecrets {
    TokenSecrets {
        access: TEST_ACCESS_SECRET.to_owned(),
        refresh: TEST_REFRESH_SECRET.to_owned(),
        admin: TEST_ADMIN_SECRET.to_owned(),
    }
}

/// 15 minute access, 30 day refresh.
pub fn test_lifetimes() -> TokenLifetimes {
    TokenLifetimes {
        access: Duration::minutes(15),
        refresh: Duration::days(30),
    }
}

pub fn test_signer() -> TokenSigner {
    TokenSigner::new(&test_secrets(), test_lifetimes())
}

/// Signer whose access tokens are already past expiry (beyond validation leeway).
pub fn expired_signer() -> TokenSigner {
    TokenSigner::new(
        &test_secrets(),
        TokenLifetimes {
            access: Duration::minutes(-10),
            refresh: Duration::minutes(-10),
        },
    )
}

/// A signed-in identity: one user, one session.
pub struct TestAuth {
    pub user_id: Uuid,
    pub session_id: Uuid,
    signer: TokenSigner,
}

impl TestAuth {
    pub fn new(user_id: Uuid, session_id: Uuid) -> Self {
        Self {
            user_id,
            session_id,
            signer: test_signer(),
        }
    }

    pub fn random() -> Self {
        Self::new(Uuid::new_v4(), Uuid::new_v4())
    }

    pub fn access_token(&self) -> String {
        self.signer
            .sign_access(self.user_id, self.session_id)
            .unwrap()
            .token
    }

    /// Admin token for this identity. It verifies, but is only accepted by
    /// the auth service if a matching allow-list entry exists.
    pub fn admin_token(&self, jti: Uuid) -> String {
        let now = Utc::now();
        self.signer
            .sign_admin(
                self.user_id,
                self.session_id,
                jti,
                ADMIN_SCOPE,
                now,
                now + Duration::minutes(15),
            )
            .unwrap()
            .token
    }

    /// `Authorization: Bearer <access token>`.
    pub fn headers(&self) -> HeaderMap {
        bearer_headers(&self.access_token())
    }

    /// Bearer header plus `x-admin-token`.
    pub fn admin_headers(&self, admin_token: &str) -> HeaderMap {
        let mut map = self.headers();
        map.insert(X_ADMIN_TOKEN, HeaderValue::from_str(admin_token).unwrap());
        map
    }
}

pub fn bearer_headers(token: &str) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    map
}
