use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde_json::json;
use uuid::Uuid;

use tessera_auth_schema::{admin_elevations, outbox_events, sessions, users};

use crate::domain::repository::{
    ElevationRepository, PasscodeMailer, SessionRepository, UserRepository,
};
use crate::domain::types::{
    AuthUser, ElevationRecord, GrantOutcome, OutboxEvent, PASSCODE_REQUESTED, SessionRecord,
};
use crate::error::AuthServiceError;

// ── User repository ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbUserRepository {
    pub db: DatabaseConnection,
}

impl UserRepository for DbUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<AuthUser>, AuthServiceError> {
        let model = users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find user by id")?;
        Ok(model.map(user_from_model))
    }

    async fn find_or_create_by_email(&self, email: &str) -> Result<AuthUser, AuthServiceError> {
        if let Some(model) = find_user_by_email(&self.db, email).await? {
            return Ok(user_from_model(model));
        }

        // Two first logins may race; the loser's insert is a no-op.
        users::Entity::insert(users::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_owned()),
            elevated_session_id: Set(None),
            elevated_until: Set(None),
            created_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::column(users::Column::Email)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await
        .context("create user")?;

        let model = find_user_by_email(&self.db, email)
            .await?
            .context("user missing after insert")?;
        tracing::info!(user_id = %model.id, "user created");
        Ok(user_from_model(model))
    }
}

async fn find_user_by_email(
    db: &DatabaseConnection,
    email: &str,
) -> Result<Option<users::Model>, AuthServiceError> {
    Ok(users::Entity::find()
        .filter(users::Column::Email.eq(email))
        .one(db)
        .await
        .context("find user by email")?)
}

fn user_from_model(model: users::Model) -> AuthUser {
    AuthUser {
        id: model.id,
        email: model.email,
        elevated_session_id: model.elevated_session_id,
        elevated_until: model.elevated_until,
    }
}

// ── Session repository ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbSessionRepository {
    pub db: DatabaseConnection,
}

impl SessionRepository for DbSessionRepository {
    async fn create(&self, record: &SessionRecord) -> Result<(), AuthServiceError> {
        sessions::ActiveModel {
            id: Set(record.id),
            user_id: Set(record.user_id),
            refresh_token_hash: Set(record.refresh_token_hash.clone()),
            device_id: Set(record.device_id.clone()),
            device_name: Set(record.device_name.clone()),
            user_agent: Set(record.user_agent.clone()),
            ip_address: Set(record.ip_address.clone()),
            created_at: Set(record.created_at),
            last_used_at: Set(record.last_used_at),
            expires_at: Set(record.expires_at),
        }
        .insert(&self.db)
        .await
        .context("create session")?;
        Ok(())
    }

    async fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<SessionRecord>, AuthServiceError> {
        let model = sessions::Entity::find()
            .filter(sessions::Column::RefreshTokenHash.eq(token_hash))
            .one(&self.db)
            .await
            .context("find session by token")?;
        Ok(model.map(session_from_model))
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AuthServiceError> {
        let result = sessions::Entity::update_many()
            .col_expr(sessions::Column::LastUsedAt, Expr::value(at))
            .filter(sessions::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("touch session")?;
        Ok(result.rows_affected > 0)
    }

    async fn delete_by_token_hash(&self, token_hash: &str) -> Result<bool, AuthServiceError> {
        let result = sessions::Entity::delete_many()
            .filter(sessions::Column::RefreshTokenHash.eq(token_hash))
            .exec(&self.db)
            .await
            .context("delete session by token")?;
        Ok(result.rows_affected > 0)
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthServiceError> {
        let result = sessions::Entity::delete_many()
            .filter(sessions::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await
            .context("delete user sessions")?;
        Ok(result.rows_affected)
    }

    async fn delete_for_user(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> Result<bool, AuthServiceError> {
        let result = sessions::Entity::delete_many()
            .filter(sessions::Column::Id.eq(session_id))
            .filter(sessions::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await
            .context("delete user session")?;
        Ok(result.rows_affected > 0)
    }

    async fn list_active(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, AuthServiceError> {
        let models = sessions::Entity::find()
            .filter(sessions::Column::UserId.eq(user_id))
            .filter(sessions::Column::ExpiresAt.gt(now))
            .order_by_desc(sessions::Column::LastUsedAt)
            .all(&self.db)
            .await
            .context("list active sessions")?;
        Ok(models.into_iter().map(session_from_model).collect())
    }

    async fn exists_active(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthServiceError> {
        let count = sessions::Entity::find()
            .filter(sessions::Column::Id.eq(session_id))
            .filter(sessions::Column::UserId.eq(user_id))
            .filter(sessions::Column::ExpiresAt.gt(now))
            .count(&self.db)
            .await
            .context("check active session")?;
        Ok(count > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        let result = sessions::Entity::delete_many()
            .filter(sessions::Column::ExpiresAt.lte(now))
            .exec(&self.db)
            .await
            .context("delete expired sessions")?;
        Ok(result.rows_affected)
    }
}

fn session_from_model(model: sessions::Model) -> SessionRecord {
    SessionRecord {
        id: model.id,
        user_id: model.user_id,
        refresh_token_hash: model.refresh_token_hash,
        device_id: model.device_id,
        device_name: model.device_name,
        user_agent: model.user_agent,
        ip_address: model.ip_address,
        created_at: model.created_at,
        last_used_at: model.last_used_at,
        expires_at: model.expires_at,
    }
}

// ── Elevation repository ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbElevationRepository {
    pub db: DatabaseConnection,
}

impl ElevationRepository for DbElevationRepository {
    async fn grant(&self, record: &ElevationRecord) -> Result<GrantOutcome, AuthServiceError> {
        let outcome = self
            .db
            .transaction::<_, GrantOutcome, DbErr>(|txn| {
                let record = record.clone();
                Box::pin(async move {
                    lock_user(txn, record.user_id)
                        .await?
                        .ok_or_else(|| DbErr::RecordNotFound(format!("user {}", record.user_id)))?;

                    let active = active_elevations(txn, record.user_id, record.issued_at).await?;
                    if active.iter().any(|e| e.session_id != record.session_id) {
                        return Ok(GrantOutcome::ActiveElsewhere);
                    }

                    let superseded: Vec<Uuid> = active.iter().map(|e| e.jti).collect();
                    if !active.is_empty() {
                        admin_elevations::Entity::update_many()
                            .col_expr(
                                admin_elevations::Column::RevokedAt,
                                Expr::value(record.issued_at),
                            )
                            .filter(
                                admin_elevations::Column::Id
                                    .is_in(active.iter().map(|e| e.id)),
                            )
                            .exec(txn)
                            .await?;
                    }

                    insert_elevation(txn, &record).await?;
                    set_pointer(
                        txn,
                        record.user_id,
                        Some(record.session_id),
                        Some(record.expires_at),
                    )
                    .await?;
                    Ok(GrantOutcome::Granted { superseded })
                })
            })
            .await
            .context("grant admin elevation")?;
        Ok(outcome)
    }

    async fn revoke(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<ElevationRecord>, AuthServiceError> {
        let revoked = self
            .db
            .transaction::<_, Option<ElevationRecord>, DbErr>(|txn| {
                Box::pin(async move {
                    let Some(user) = lock_user(txn, user_id).await? else {
                        return Ok(None);
                    };

                    let active = admin_elevations::Entity::find()
                        .filter(admin_elevations::Column::UserId.eq(user_id))
                        .filter(admin_elevations::Column::SessionId.eq(session_id))
                        .filter(admin_elevations::Column::RevokedAt.is_null())
                        .filter(admin_elevations::Column::ExpiresAt.gt(now))
                        .order_by_desc(admin_elevations::Column::IssuedAt)
                        .one(txn)
                        .await?;
                    let Some(active) = active else {
                        return Ok(None);
                    };

                    let mut model: admin_elevations::ActiveModel = active.into();
                    model.revoked_at = Set(Some(now));
                    let updated = model.update(txn).await?;

                    if user.elevated_session_id == Some(session_id) {
                        set_pointer(txn, user_id, None, None).await?;
                    }
                    Ok(Some(elevation_from_model(updated)))
                })
            })
            .await
            .context("revoke admin elevation")?;
        Ok(revoked)
    }
}

/// `SELECT ... FOR UPDATE` on the user row; serializes elevate/revoke per user.
async fn lock_user(
    txn: &DatabaseTransaction,
    user_id: Uuid,
) -> Result<Option<users::Model>, DbErr> {
    users::Entity::find_by_id(user_id)
        .lock_exclusive()
        .one(txn)
        .await
}

async fn active_elevations(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<admin_elevations::Model>, DbErr> {
    admin_elevations::Entity::find()
        .filter(admin_elevations::Column::UserId.eq(user_id))
        .filter(admin_elevations::Column::RevokedAt.is_null())
        .filter(admin_elevations::Column::ExpiresAt.gt(now))
        .all(txn)
        .await
}

async fn insert_elevation(txn: &DatabaseTransaction, record: &ElevationRecord) -> Result<(), DbErr> {
    admin_elevations::ActiveModel {
        id: Set(record.id),
        user_id: Set(record.user_id),
        session_id: Set(record.session_id),
        jti: Set(record.jti),
        issued_at: Set(record.issued_at),
        expires_at: Set(record.expires_at),
        revoked_at: Set(None),
        ip_address: Set(record.ip_address.clone()),
        user_agent: Set(record.user_agent.clone()),
    }
    .insert(txn)
    .await?;
    Ok(())
}

async fn set_pointer(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    session_id: Option<Uuid>,
    until: Option<DateTime<Utc>>,
) -> Result<(), DbErr> {
    users::ActiveModel {
        id: Set(user_id),
        elevated_session_id: Set(session_id),
        elevated_until: Set(until),
        ..Default::default()
    }
    .update(txn)
    .await?;
    Ok(())
}

fn elevation_from_model(model: admin_elevations::Model) -> ElevationRecord {
    ElevationRecord {
        id: model.id,
        user_id: model.user_id,
        session_id: model.session_id,
        jti: model.jti,
        issued_at: model.issued_at,
        expires_at: model.expires_at,
        revoked_at: model.revoked_at,
        ip_address: model.ip_address,
        user_agent: model.user_agent,
    }
}

// ── Passcode mailer (outbox) ──────────────────────────────────────────────────

/// Enqueues passcode emails into `outbox_events`; a separate worker delivers them.
#[derive(Clone)]
pub struct OutboxPasscodeMailer {
    pub db: DatabaseConnection,
}

impl PasscodeMailer for OutboxPasscodeMailer {
    async fn enqueue(
        &self,
        email: &str,
        passcode: &str,
        otp_id: Uuid,
        discard_after: DateTime<Utc>,
    ) -> Result<(), AuthServiceError> {
        let event = OutboxEvent {
            id: Uuid::new_v4(),
            kind: PASSCODE_REQUESTED.to_owned(),
            recipient: email.to_owned(),
            payload: json!({ "email": email, "passcode": passcode, "otp_id": otp_id }),
            idempotency_key: format!("{PASSCODE_REQUESTED}:{otp_id}"),
            discard_after,
        };
        insert_outbox_event(&self.db, &event)
            .await
            .context("enqueue passcode email")?;
        Ok(())
    }
}

async fn insert_outbox_event(db: &DatabaseConnection, event: &OutboxEvent) -> Result<(), DbErr> {
    let now = Utc::now();
    outbox_events::ActiveModel {
        id: Set(event.id),
        kind: Set(event.kind.clone()),
        recipient: Set(event.recipient.clone()),
        payload: Set(event.payload.clone()),
        idempotency_key: Set(event.idempotency_key.clone()),
        attempts: Set(0),
        last_error: Set(None),
        created_at: Set(now),
        deliver_after: Set(now),
        discard_after: Set(event.discard_after),
        delivered_at: Set(None),
    }
    .insert(db)
    .await?;
    Ok(())
}
