use axum::{Json, extract::State, http::StatusCode};
use deadpool_redis::redis;

use tessera_core::health::{Readiness, readiness};

use crate::state::AppState;

/// `GET /readyz`: database and Redis must both answer.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let database = state.db.ping().await.is_ok();
    let redis = match state.redis.get().await {
        Ok(mut conn) => redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok(),
        Err(_) => false,
    };
    if !(database && redis) {
        tracing::warn!(database, redis, "readiness check failed");
    }
    readiness(vec![("database", database), ("redis", redis)])
}
