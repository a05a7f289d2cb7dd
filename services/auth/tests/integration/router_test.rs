use std::sync::Arc;

use axum::http::{HeaderMap, Method, StatusCode};
use sea_orm::DatabaseConnection;
use tower::ServiceExt;
use uuid::Uuid;

use tessera_auth::config::AuthConfig;
use tessera_auth::router::build_router;
use tessera_auth::state::AppState;
use tessera_testing::auth::{
    TEST_ACCESS_SECRET, TEST_ADMIN_SECRET, TEST_REFRESH_SECRET, TestAuth, bearer_headers,
    expired_signer, test_signer,
};
use tessera_testing::http::{read_json, request};

/// State with no reachable backing stores. Every route exercised here must
/// answer before touching the database or Redis.
fn offline_state() -> AppState {
    let config: AuthConfig = serde_json::from_value(serde_json::json!({
        "database_url": "postgres://127.0.0.1:1/auth",
        "redis_url": "redis://127.0.0.1:1",
        "access_token_secret": TEST_ACCESS_SECRET,
        "refresh_token_secret": TEST_REFRESH_SECRET,
        "admin_token_secret": TEST_ADMIN_SECRET,
        "admin_password_hash": "hash",
    }))
    .unwrap();
    let redis = deadpool_redis::Config::from_url(&config.redis_url)
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .unwrap();
    AppState {
        db: DatabaseConnection::default(),
        redis,
        signer: Arc::new(test_signer()),
        config: Arc::new(config),
    }
}

#[tokio::test]
async fn healthz_echoes_request_id() {
    let response = build_router(offline_state())
        .oneshot(request(Method::GET, "/healthz", HeaderMap::new(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let id = response.headers().get("x-request-id").unwrap();
    assert!(Uuid::parse_str(id.to_str().unwrap()).is_ok());
}

#[tokio::test]
async fn readyz_reports_unreachable_dependencies() {
    let response = build_router(offline_state())
        .oneshot(request(Method::GET, "/readyz", HeaderMap::new(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = read_json(response).await;
    assert_eq!(json["ready"], false);
}

#[tokio::test]
async fn guarded_route_requires_bearer() {
    let response = build_router(offline_state())
        .oneshot(request(Method::GET, "/auth/devices", HeaderMap::new(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["kind"], "MISSING_TOKEN");
}

#[tokio::test]
async fn session_probe_reports_expired_token() {
    let token = expired_signer()
        .sign_access(Uuid::new_v4(), Uuid::new_v4())
        .unwrap()
        .token;
    let response = build_router(offline_state())
        .oneshot(request(
            Method::GET,
            "/auth/session",
            bearer_headers(&token),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["kind"], "TOKEN_EXPIRED");
}

#[tokio::test]
async fn refresh_rejects_garbage_token() {
    let response = build_router(offline_state())
        .oneshot(request(
            Method::POST,
            "/auth/token/refresh",
            HeaderMap::new(),
            Some(serde_json::json!({ "refresh_token": "not-a-jwt" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(response).await["kind"], "TOKEN_INVALID");
}

#[tokio::test]
async fn admin_check_requires_admin_token() {
    let auth = TestAuth::random();
    let response = build_router(offline_state())
        .oneshot(request(Method::GET, "/auth/admin/check", auth.headers(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(read_json(response).await["kind"], "ELEVATION_REQUIRED");
}
