use std::time::Duration;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Connection, Pool};
use uuid::Uuid;

use crate::domain::repository::{
    AttemptLimiter, ElevationAllowList, ExpiryIndex, PasscodeStore,
};
use crate::domain::types::{
    ExpiryMember, JtiElevationEntry, PasscodeRecord, UserElevationEntry, expiry_score,
};
use crate::error::AuthServiceError;

const EXPIRY_INDEX_KEY: &str = "admin:elevation:expiry";

fn passcode_key(email: &str) -> String {
    format!("passcode:{email}")
}

fn elevation_user_key(user_id: Uuid) -> String {
    format!("admin:elevation:user:{user_id}")
}

fn elevation_jti_key(jti: Uuid) -> String {
    format!("admin:elevation:jti:{jti}")
}

fn elevation_failures_key(user_id: Uuid) -> String {
    format!("admin:elevation:failures:{user_id}")
}

async fn connection(pool: &Pool) -> Result<Connection, AuthServiceError> {
    Ok(pool.get().await.context("get redis connection")?)
}

/// Sub-millisecond TTLs would be rejected by Redis; round up to 1 ms.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn decode<T: serde::de::DeserializeOwned>(
    raw: Option<String>,
    what: &'static str,
) -> Result<Option<T>, AuthServiceError> {
    raw.map(|s| serde_json::from_str(&s).context(what))
        .transpose()
        .map_err(AuthServiceError::from)
}

// ── Passcodes ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RedisPasscodeStore {
    pub pool: Pool,
}

impl PasscodeStore for RedisPasscodeStore {
    async fn get(&self, email: &str) -> Result<Option<PasscodeRecord>, AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let raw: Option<String> = conn
            .get(passcode_key(email))
            .await
            .context("get passcode")?;
        decode(raw, "decode passcode record")
    }

    async fn put(
        &self,
        email: &str,
        record: &PasscodeRecord,
        ttl: Duration,
    ) -> Result<(), AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let value = serde_json::to_string(record).context("encode passcode record")?;
        let (): () = conn
            .pset_ex(passcode_key(email), value, ttl_millis(ttl))
            .await
            .context("store passcode")?;
        Ok(())
    }

    async fn put_if_absent(
        &self,
        email: &str,
        record: &PasscodeRecord,
        ttl: Duration,
    ) -> Result<bool, AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let value = serde_json::to_string(record).context("encode passcode record")?;
        // SET NX replies nil when the key already exists.
        let stored: Option<String> = redis::cmd("SET")
            .arg(passcode_key(email))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .context("store fresh passcode")?;
        Ok(stored.is_some())
    }

    async fn remaining_ttl(&self, email: &str) -> Result<Option<Duration>, AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        // PTTL: -2 missing key, -1 no expiry.
        let ms: i64 = conn
            .pttl(passcode_key(email))
            .await
            .context("read passcode ttl")?;
        Ok(u64::try_from(ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis))
    }

    async fn delete(&self, email: &str) -> Result<(), AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let (): () = conn
            .del(passcode_key(email))
            .await
            .context("delete passcode")?;
        Ok(())
    }
}

// ── Elevation allow-list + expiry index ──────────────────────────────────────

#[derive(Clone)]
pub struct RedisElevationCache {
    pub pool: Pool,
}

impl ElevationAllowList for RedisElevationCache {
    async fn grant(
        &self,
        user_id: Uuid,
        entry: &UserElevationEntry,
        ttl: Duration,
    ) -> Result<(), AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let user_key = elevation_user_key(user_id);

        let previous: Option<UserElevationEntry> = decode(
            conn.get(&user_key).await.context("read elevation user entry")?,
            "decode elevation user entry",
        )?;

        let user_value = serde_json::to_string(entry).context("encode elevation user entry")?;
        let jti_value = serde_json::to_string(&JtiElevationEntry {
            user_id,
            session_id: entry.session_id,
        })
        .context("encode elevation jti entry")?;
        let ttl_ms = ttl_millis(ttl);

        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(prev) = previous.filter(|p| p.jti != entry.jti) {
            pipe.del(elevation_jti_key(prev.jti)).ignore();
        }
        pipe.pset_ex(&user_key, user_value, ttl_ms)
            .ignore()
            .pset_ex(elevation_jti_key(entry.jti), jti_value, ttl_ms)
            .ignore();
        let (): () = pipe
            .query_async(&mut conn)
            .await
            .context("write elevation allow-list")?;
        Ok(())
    }

    async fn revoke(&self, user_id: Uuid) -> Result<Option<Uuid>, AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let user_key = elevation_user_key(user_id);

        let current: Option<UserElevationEntry> = decode(
            conn.get(&user_key).await.context("read elevation user entry")?,
            "decode elevation user entry",
        )?;
        let jti = current.map(|c| c.jti);
        if let Some(jti) = jti {
            let (): () = conn
                .del(elevation_jti_key(jti))
                .await
                .context("delete elevation jti entry")?;
        }
        let (): () = conn
            .del(&user_key)
            .await
            .context("delete elevation user entry")?;
        Ok(jti)
    }

    async fn find_by_jti(&self, jti: Uuid) -> Result<Option<JtiElevationEntry>, AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let raw: Option<String> = conn
            .get(elevation_jti_key(jti))
            .await
            .context("read elevation jti entry")?;
        decode(raw, "decode elevation jti entry")
    }
}

impl ExpiryIndex for RedisElevationCache {
    async fn add(
        &self,
        member: ExpiryMember,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let (): () = conn
            .zadd(EXPIRY_INDEX_KEY, member.encode(), expiry_score(expires_at))
            .await
            .context("add elevation expiry")?;
        Ok(())
    }

    async fn remove(&self, member: &str) -> Result<bool, AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let removed: i64 = conn
            .zrem(EXPIRY_INDEX_KEY, member)
            .await
            .context("remove elevation expiry")?;
        Ok(removed > 0)
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<String>, AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let members: Vec<String> = conn
            .zrangebyscore(EXPIRY_INDEX_KEY, "-inf", now.timestamp_millis())
            .await
            .context("read due elevation expiries")?;
        Ok(members)
    }
}

// ── Elevation failure counter ─────────────────────────────────────────────────

#[derive(Clone)]
pub struct RedisAttemptLimiter {
    pub pool: Pool,
}

impl AttemptLimiter for RedisAttemptLimiter {
    async fn failures(&self, user_id: Uuid) -> Result<u32, AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let count: Option<u32> = conn
            .get(elevation_failures_key(user_id))
            .await
            .context("read elevation failures")?;
        Ok(count.unwrap_or(0))
    }

    async fn record_failure(
        &self,
        user_id: Uuid,
        window: Duration,
    ) -> Result<u32, AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let key = elevation_failures_key(user_id);
        let count: u32 = conn.incr(&key, 1).await.context("count elevation failure")?;
        if count == 1 {
            let secs = i64::try_from(window.as_secs()).unwrap_or(i64::MAX).max(1);
            let (): () = conn
                .expire(&key, secs)
                .await
                .context("set elevation failure window")?;
        }
        Ok(count)
    }

    async fn reset(&self, user_id: Uuid) -> Result<(), AuthServiceError> {
        let mut conn = connection(&self.pool).await?;
        let (): () = conn
            .del(elevation_failures_key(user_id))
            .await
            .context("reset elevation failures")?;
        Ok(())
    }
}
