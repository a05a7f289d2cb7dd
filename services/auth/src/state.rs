use std::sync::Arc;

use deadpool_redis::Pool as RedisPool;
use sea_orm::DatabaseConnection;

use tessera_auth_types::token::{TokenSigner, TokenVerifier};

use crate::config::AuthConfig;
use crate::infra::cache::{RedisAttemptLimiter, RedisElevationCache, RedisPasscodeStore};
use crate::infra::db::{
    DbElevationRepository, DbSessionRepository, DbUserRepository, OutboxPasscodeMailer,
};
use crate::infra::notifier::RedisRealtimeNotifier;
use crate::usecase::elevation::ElevationService;
use crate::usecase::passcode::PasscodeService;
use crate::usecase::session::SessionService;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub redis: RedisPool,
    pub signer: Arc<TokenSigner>,
    pub config: Arc<AuthConfig>,
}

pub type AppElevationService = ElevationService<
    DbElevationRepository,
    RedisElevationCache,
    RedisElevationCache,
    RedisAttemptLimiter,
    RedisRealtimeNotifier,
    DbUserRepository,
>;

impl AppState {
    pub fn verifier(&self) -> &TokenVerifier {
        self.signer.verifier()
    }

    pub fn user_repo(&self) -> DbUserRepository {
        DbUserRepository {
            db: self.db.clone(),
        }
    }

    pub fn session_repo(&self) -> DbSessionRepository {
        DbSessionRepository {
            db: self.db.clone(),
        }
    }

    pub fn elevation_repo(&self) -> DbElevationRepository {
        DbElevationRepository {
            db: self.db.clone(),
        }
    }

    pub fn passcode_mailer(&self) -> OutboxPasscodeMailer {
        OutboxPasscodeMailer {
            db: self.db.clone(),
        }
    }

    pub fn passcode_store(&self) -> RedisPasscodeStore {
        RedisPasscodeStore {
            pool: self.redis.clone(),
        }
    }

    pub fn elevation_cache(&self) -> RedisElevationCache {
        RedisElevationCache {
            pool: self.redis.clone(),
        }
    }

    pub fn attempt_limiter(&self) -> RedisAttemptLimiter {
        RedisAttemptLimiter {
            pool: self.redis.clone(),
        }
    }

    pub fn notifier(&self) -> RedisRealtimeNotifier {
        RedisRealtimeNotifier {
            pool: self.redis.clone(),
        }
    }

    pub fn passcode_service(&self) -> PasscodeService<RedisPasscodeStore, OutboxPasscodeMailer> {
        PasscodeService {
            store: self.passcode_store(),
            mailer: self.passcode_mailer(),
            policy: self.config.passcode_policy(),
        }
    }

    pub fn session_service(&self) -> SessionService<DbSessionRepository> {
        SessionService {
            sessions: self.session_repo(),
            signer: Arc::clone(&self.signer),
        }
    }

    pub fn elevation_service(&self) -> AppElevationService {
        ElevationService {
            elevations: self.elevation_repo(),
            allow_list: self.elevation_cache(),
            index: self.elevation_cache(),
            limiter: self.attempt_limiter(),
            notifier: self.notifier(),
            users: self.user_repo(),
            signer: Arc::clone(&self.signer),
            policy: self.config.elevation_policy(),
        }
    }
}
