use anyhow::Context as _;
use deadpool_redis::Pool;
use deadpool_redis::redis::AsyncCommands;
use serde_json::json;
use uuid::Uuid;

use crate::domain::repository::RealtimeNotifier;
use crate::error::AuthServiceError;

/// Channel the realtime gateway subscribes to for one user's connections.
pub fn user_channel(user_id: Uuid) -> String {
    format!("realtime:user:{user_id}")
}

/// Publishes `{event, payload}` on the user's Redis channel. Delivery is
/// best-effort: nobody listening is not an error.
#[derive(Clone)]
pub struct RedisRealtimeNotifier {
    pub pool: Pool,
}

impl RealtimeNotifier for RedisRealtimeNotifier {
    async fn notify_user(
        &self,
        user_id: Uuid,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), AuthServiceError> {
        let mut conn = self.pool.get().await.context("get redis connection")?;
        let message = json!({ "event": event, "payload": payload }).to_string();
        let receivers: i64 = conn
            .publish(user_channel(user_id), message)
            .await
            .context("publish realtime event")?;
        tracing::debug!(user_id = %user_id, event, receivers, "realtime event published");
        Ok(())
    }
}
